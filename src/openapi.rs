use crate::models::{Issue, IssueFilter, IssueStatus, ProfileRole, Reporter, RoomDetails, UserProfile};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::get_catalog,
        crate::routes::get_my_profile,
        crate::routes::submit_room_details,
        crate::routes::submit_report,
        crate::routes::list_open_issues,
        crate::routes::get_issue,
        crate::routes::set_issue_status,
        crate::routes::list_pending_profiles,
        crate::routes::approve_profile,
    ),
    components(schemas(
        Issue, IssueStatus, IssueFilter, Reporter, UserProfile, ProfileRole, RoomDetails,
        crate::routes::CatalogResponse, crate::routes::ReportRequest, crate::routes::ReportResponse,
        crate::routes::OutcomeKind, crate::routes::StatusUpdate
    )),
    tags(
        (name = "reports", description = "Issue reporting and consolidation"),
        (name = "issues", description = "Caretaker triage"),
        (name = "profiles", description = "Resident verification"),
    )
)]
pub struct ApiDoc;
