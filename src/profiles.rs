use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{ProfileRole, RoomDetails, UserProfile};
use crate::service::{decode_all, non_blank, HostelService};
use crate::store::{
    run_transaction, server_timestamp, to_fields, Document, Filter, Listener, StoreResult, Subscription, Transaction,
    TransactionBody,
};

const UNKNOWN_EMAIL: &str = "N/A";

struct CreatePendingProfile<'a> {
    path: &'a str,
    user_id: &'a str,
    email: &'a str,
}

#[async_trait]
impl<'a> TransactionBody for CreatePendingProfile<'a> {
    type Output = bool;

    async fn run(&self, tx: &mut dyn Transaction) -> StoreResult<bool> {
        if tx.get(self.path, self.user_id).await?.is_some() {
            return Ok(false);
        }
        tx.set(
            self.path,
            self.user_id,
            to_fields(json!({
                "userId": self.user_id,
                "role": ProfileRole::Pending.as_str(),
                "email": self.email,
                "createdAt": server_timestamp(),
            })),
        );
        Ok(true)
    }
}

fn awaiting_verification(profile: &UserProfile) -> bool {
    profile.role == ProfileRole::Submitted
        && non_blank(profile.temp_block.as_deref()).is_some()
        && non_blank(profile.temp_room.as_deref()).is_some()
}

fn pending_view(profiles: Vec<UserProfile>) -> Vec<UserProfile> {
    let mut pending: Vec<UserProfile> = profiles.into_iter().filter(awaiting_verification).collect();
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    pending
}

fn checked_user_id(user_id: &str) -> ServiceResult<&str> {
    non_blank(Some(user_id)).ok_or(ServiceError::NotFound)
}

impl HostelService {
    pub async fn get_profile(&self, user_id: &str) -> ServiceResult<UserProfile> {
        let user_id = checked_user_id(user_id)?;
        let doc = self.store.get_by_id(&self.cfg.profiles_path(), user_id).await?;
        Ok(doc.decode()?)
    }

    /// Load the caller's profile, creating a `pending` one on first sight.
    #[instrument(skip(self, email))]
    pub async fn ensure_profile(&self, user_id: &str, email: Option<&str>) -> ServiceResult<UserProfile> {
        let user_id = checked_user_id(user_id)?;
        let path = self.cfg.profiles_path();
        let body = CreatePendingProfile {
            path: &path,
            user_id,
            email: non_blank(email).unwrap_or(UNKNOWN_EMAIL),
        };
        if run_transaction(self.store.as_ref(), &body).await? {
            metrics::increment_counter!("hostel_profiles_created_total");
            info!(user_id, "created pending profile");
        }
        self.get_profile(user_id).await
    }

    /// Record the room a pending user claims to live in, for later approval.
    #[instrument(skip(self))]
    pub async fn submit_room_details(&self, user_id: &str, details: &RoomDetails) -> ServiceResult<UserProfile> {
        let block = details.block.trim();
        if !self.cfg.has_block(block) {
            return Err(ServiceError::Validation(format!("unknown block '{block}'")));
        }
        let room = non_blank(Some(details.room.as_str()))
            .ok_or_else(|| ServiceError::Validation("room is required".into()))?
            .to_uppercase();

        let profile = self.get_profile(user_id).await?;
        if matches!(profile.role, ProfileRole::Student | ProfileRole::Caretaker) {
            return Err(ServiceError::Validation("profile is already verified".into()));
        }
        let fields = to_fields(json!({
            "tempBlock": block,
            "tempRoom": room,
            "role": ProfileRole::Submitted.as_str(),
            "status": "submitted",
        }));
        self.store.update_document(&self.cfg.profiles_path(), &profile.user_id, fields).await?;
        info!(user_id = %profile.user_id, block, room = %room, "room details submitted");
        self.get_profile(&profile.user_id).await
    }

    /// Profiles with submitted room details, oldest first.
    pub async fn list_pending_profiles(&self) -> ServiceResult<Vec<UserProfile>> {
        let docs = self
            .store
            .query(&self.cfg.profiles_path(), &[Filter::eq("role", ProfileRole::Submitted.as_str())])
            .await?;
        Ok(pending_view(decode_all(docs)))
    }

    pub async fn watch_pending_profiles<F>(&self, on_change: F) -> ServiceResult<Subscription>
    where
        F: Fn(Vec<UserProfile>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(move |docs: Vec<Document>| on_change(pending_view(decode_all(docs))));
        let filters = vec![Filter::eq("role", ProfileRole::Submitted.as_str())];
        Ok(self.store.subscribe(&self.cfg.profiles_path(), filters, listener).await?)
    }

    /// Promote a pending profile to `student`, moving its self-declared room
    /// into the permanent fields.
    #[instrument(skip(self, profile), fields(user_id = %profile.user_id))]
    pub async fn approve_user(&self, profile: &UserProfile) -> ServiceResult<UserProfile> {
        let user_id = checked_user_id(&profile.user_id)?;
        let (Some(block), Some(room)) = (non_blank(profile.temp_block.as_deref()), non_blank(profile.temp_room.as_deref())) else {
            return Err(ServiceError::Validation("profile has no room details to verify".into()));
        };
        let fields = to_fields(json!({
            "role": ProfileRole::Student.as_str(),
            "block": block,
            "roomNumber": room,
            "verifiedAt": server_timestamp(),
            "tempBlock": Value::Null,
            "tempRoom": Value::Null,
            "status": "verified",
        }));
        self.store.update_document(&self.cfg.profiles_path(), user_id, fields).await?;
        metrics::increment_counter!("hostel_profiles_verified_total");
        info!(block, room, "user verified");
        self.get_profile(user_id).await
    }
}
