#![cfg(feature = "inmem-store")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostel_issues::{
    error::ServiceError,
    models::{Issue, IssueFilter, IssueStatus, NewReport},
    store::inmem::InMemStore,
    HostelConfig, HostelService,
};

fn service() -> (HostelService, InMemStore) {
    let store = InMemStore::new();
    (HostelService::new(Arc::new(store.clone()), HostelConfig::default()), store)
}

fn report(block: &str, floor: u8, category: &str, room: &str, urgent: bool) -> NewReport {
    NewReport {
        block: Some(block.into()),
        floor: Some(floor),
        category: Some(category.into()),
        description: Some("needs attention".into()),
        is_urgent: urgent,
        reporter_room: Some(room.into()),
        reporter_user_id: Some(format!("user-{room}")),
    }
}

async fn file(svc: &HostelService, r: NewReport) -> String {
    let id = svc.submit_report(r).await.unwrap().issue_id().to_string();
    // keep createdAt strictly increasing between filings
    tokio::time::sleep(Duration::from_millis(2)).await;
    id
}

#[tokio::test]
async fn status_can_be_set_and_missing_issue_is_not_found() {
    let (svc, _store) = service();
    let id = file(&svc, report("A", 1, "Cleaning", "101", false)).await;

    svc.set_status(&id, IssueStatus::InProgress).await.unwrap();
    assert_eq!(svc.get_issue(&id).await.unwrap().status, IssueStatus::InProgress);

    svc.set_status(&id, IssueStatus::Resolved).await.unwrap();
    assert_eq!(svc.get_issue(&id).await.unwrap().status, IssueStatus::Resolved);

    assert!(matches!(svc.set_status("missing", IssueStatus::Resolved).await, Err(ServiceError::NotFound)));
    assert!(matches!(svc.set_status("", IssueStatus::New).await, Err(ServiceError::NotFound)));
}

#[tokio::test]
async fn status_write_on_unreachable_store_is_store_unavailable() {
    let (svc, store) = service();
    let id = file(&svc, report("A", 1, "Cleaning", "101", false)).await;
    store.set_offline(true);
    assert!(matches!(
        svc.set_status(&id, IssueStatus::Resolved).await,
        Err(ServiceError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn open_issues_are_filtered_and_sorted_urgent_then_oldest() {
    let (svc, _store) = service();
    let old_a = file(&svc, report("A", 1, "Cleaning", "101", false)).await;
    let urgent_b = file(&svc, report("B", 2, "Lift Issue", "201", true)).await;
    let newer_a = file(&svc, report("A", 3, "Other", "301", false)).await;
    let urgent_a = file(&svc, report("A", 4, "Power Supply", "401", true)).await;
    let done = file(&svc, report("C", 1, "Pest Control", "102", true)).await;
    svc.set_status(&done, IssueStatus::Resolved).await.unwrap();

    let ids = |issues: Vec<Issue>| issues.into_iter().map(|i| i.id).collect::<Vec<_>>();

    let all = svc.list_open_issues(&IssueFilter::default()).await.unwrap();
    assert_eq!(ids(all), vec![urgent_b.clone(), urgent_a.clone(), old_a.clone(), newer_a.clone()]);

    let block_a = svc
        .list_open_issues(&IssueFilter { block: Some("A".into()), urgent_only: false })
        .await
        .unwrap();
    assert_eq!(ids(block_a), vec![urgent_a.clone(), old_a, newer_a]);

    let urgent = svc
        .list_open_issues(&IssueFilter { block: None, urgent_only: true })
        .await
        .unwrap();
    assert_eq!(ids(urgent), vec![urgent_b, urgent_a]);
}

#[tokio::test]
async fn watcher_follows_dashboard_until_dropped() {
    let (svc, _store) = service();
    let first = file(&svc, report("D", 1, "Cleaning", "101", false)).await;

    let views: Arc<Mutex<Vec<usize>>> = Arc::default();
    let sink = views.clone();
    let sub = svc
        .watch_open_issues(&IssueFilter { block: Some("D".into()), urgent_only: false }, move |issues| {
            sink.lock().unwrap().push(issues.len());
        })
        .await
        .unwrap();

    file(&svc, report("D", 2, "Cleaning", "201", false)).await;
    file(&svc, report("A", 2, "Cleaning", "201", false)).await; // other block, view unchanged
    svc.set_status(&first, IssueStatus::Resolved).await.unwrap();
    drop(sub);
    file(&svc, report("D", 3, "Cleaning", "301", false)).await;

    assert_eq!(*views.lock().unwrap(), vec![1, 2, 2, 1]);
}
