#![cfg(feature = "inmem-store")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostel_issues::{
    error::ServiceError,
    models::{ProfileRole, RoomDetails, UserProfile},
    store::inmem::InMemStore,
    HostelConfig, HostelService,
};

fn service() -> HostelService {
    HostelService::new(Arc::new(InMemStore::new()), HostelConfig::default())
}

fn room(block: &str, room: &str) -> RoomDetails {
    RoomDetails { block: block.into(), room: room.into() }
}

async fn submitted(svc: &HostelService, uid: &str, block: &str, number: &str) -> UserProfile {
    svc.ensure_profile(uid, None).await.unwrap();
    let profile = svc.submit_room_details(uid, &room(block, number)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    profile
}

#[tokio::test]
async fn first_sight_creates_pending_profile_once() {
    let svc = service();

    let created = svc.ensure_profile("u1", None).await.unwrap();
    assert_eq!(created.role, ProfileRole::Pending);
    assert_eq!(created.email, "N/A");
    assert!(created.created_at.is_some());

    // a later login with an email does not overwrite the existing profile
    let again = svc.ensure_profile("u1", Some("u1@hostel.test")).await.unwrap();
    assert_eq!(again.email, "N/A");
    assert_eq!(again.created_at, created.created_at);

    assert!(matches!(svc.get_profile("nobody").await, Err(ServiceError::NotFound)));
    assert!(matches!(svc.ensure_profile("  ", None).await, Err(ServiceError::NotFound)));
}

#[tokio::test]
async fn room_details_are_normalised_and_validated() {
    let svc = service();
    svc.ensure_profile("u1", Some("u1@hostel.test")).await.unwrap();

    let profile = svc.submit_room_details("u1", &room("B", " 12a ")).await.unwrap();
    assert_eq!(profile.role, ProfileRole::Submitted);
    assert_eq!(profile.temp_block.as_deref(), Some("B"));
    assert_eq!(profile.temp_room.as_deref(), Some("12A"));
    assert_eq!(profile.status.as_deref(), Some("submitted"));

    assert!(matches!(svc.submit_room_details("u1", &room("Q", "101")).await, Err(ServiceError::Validation(_))));
    assert!(matches!(svc.submit_room_details("u1", &room("A", "  ")).await, Err(ServiceError::Validation(_))));
    assert!(matches!(svc.submit_room_details("ghost", &room("A", "101")).await, Err(ServiceError::NotFound)));
}

#[tokio::test]
async fn pending_list_is_oldest_first_and_excludes_others() {
    let svc = service();
    submitted(&svc, "early", "A", "101").await;
    svc.ensure_profile("idle", None).await.unwrap();
    submitted(&svc, "late", "C", "303").await;

    let pending: Vec<_> = svc.list_pending_profiles().await.unwrap().into_iter().map(|p| p.user_id).collect();
    assert_eq!(pending, vec!["early", "late"]);
}

#[tokio::test]
async fn approval_moves_room_into_permanent_fields() {
    let svc = service();
    let profile = submitted(&svc, "u1", "D", "402").await;

    let verified = svc.approve_user(&profile).await.unwrap();
    assert_eq!(verified.role, ProfileRole::Student);
    assert_eq!(verified.assigned_room(), Some(("D", "402")));
    assert_eq!(verified.temp_block, None);
    assert_eq!(verified.temp_room, None);
    assert!(verified.verified_at.is_some());
    assert!(svc.list_pending_profiles().await.unwrap().is_empty());

    // verified residents cannot redeclare their room
    assert!(matches!(svc.submit_room_details("u1", &room("A", "101")).await, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn approval_rejects_blank_unknown_and_incomplete_profiles() {
    let svc = service();

    let mut ghost = submitted(&svc, "u1", "A", "101").await;
    ghost.user_id = "ghost".into();
    assert!(matches!(svc.approve_user(&ghost).await, Err(ServiceError::NotFound)));

    ghost.user_id = String::new();
    assert!(matches!(svc.approve_user(&ghost).await, Err(ServiceError::NotFound)));

    let fresh = svc.ensure_profile("u2", None).await.unwrap();
    assert!(matches!(svc.approve_user(&fresh).await, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn pending_watch_tracks_submissions_and_approvals() {
    let svc = service();
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let sink = seen.clone();
    let sub = svc
        .watch_pending_profiles(move |profiles| {
            sink.lock().unwrap().push(profiles.into_iter().map(|p| p.user_id).collect());
        })
        .await
        .unwrap();

    let profile = submitted(&svc, "u1", "A", "101").await;
    svc.approve_user(&profile).await.unwrap();
    sub.cancel();
    submitted(&svc, "u2", "B", "201").await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&Vec::<String>::new()));
    assert!(seen.contains(&vec!["u1".to_string()]));
    assert_eq!(seen.last(), Some(&Vec::<String>::new()));
    assert!(seen.iter().all(|ids| !ids.contains(&"u2".to_string())));
}
