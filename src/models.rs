use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Store-assigned document identifiers
pub type Id = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum IssueStatus {
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl IssueStatus {
    /// Statuses that still count as an open ticket.
    pub const OPEN: [IssueStatus; 2] = [IssueStatus::New, IssueStatus::InProgress];

    pub fn is_open(self) -> bool {
        !matches!(self, IssueStatus::Resolved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::New => "New",
            IssueStatus::InProgress => "In Progress",
            IssueStatus::Resolved => "Resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reporter {
    pub room: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: Id,
    pub block: String,
    pub floor: u8,
    pub category: String,
    pub consolidation_key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_urgent: bool,
    pub status: IssueStatus,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reporters: Vec<Reporter>,
}

impl Issue {
    pub fn reported_by_room(&self, room: &str) -> bool {
        self.reporters.iter().any(|r| r.room == room)
    }
}

/// A student's report as received from the caller. Optional fields are
/// checked by the consolidation service before the store is touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReport {
    pub block: Option<String>,
    pub floor: Option<u8>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_urgent: bool,
    pub reporter_room: Option<String>,
    pub reporter_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    Created { issue_id: Id },
    Consolidated { issue_id: Id, reporter_count: usize },
    AlreadyReported { issue_id: Id },
}

impl ConsolidationOutcome {
    pub fn issue_id(&self) -> &str {
        match self {
            ConsolidationOutcome::Created { issue_id }
            | ConsolidationOutcome::Consolidated { issue_id, .. }
            | ConsolidationOutcome::AlreadyReported { issue_id } => issue_id,
        }
    }
}

/// Caretaker dashboard narrowing; `None` means no restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueFilter {
    pub block: Option<String>,
    #[serde(default)]
    pub urgent_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    Pending,
    Submitted,
    Student,
    Caretaker,
}

impl ProfileRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileRole::Pending => "pending",
            ProfileRole::Submitted => "submitted",
            ProfileRole::Student => "student",
            ProfileRole::Caretaker => "caretaker",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Id,
    #[serde(default)]
    pub email: String,
    pub role: ProfileRole,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub temp_block: Option<String>,
    #[serde(default)]
    pub temp_room: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Verified residents carry a permanent block and room.
    pub fn assigned_room(&self) -> Option<(&str, &str)> {
        match (self.block.as_deref(), self.room_number.as_deref()) {
            (Some(b), Some(r)) if !b.is_empty() && !r.is_empty() => Some((b, r)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomDetails {
    pub block: String,
    pub room: String,
}
