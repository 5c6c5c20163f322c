use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Auth, Role};
use crate::error::{ApiError, ServiceError};
use crate::models::*;
use crate::require_role;
use crate::service::HostelService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/catalog").route(web::get().to(get_catalog)))
            .service(web::resource("/profile").route(web::get().to(get_my_profile)))
            .service(web::resource("/profile/room").route(web::put().to(submit_room_details)))
            .service(web::resource("/reports").route(web::post().to(submit_report)))
            .service(web::resource("/issues").route(web::get().to(list_open_issues)))
            .service(web::resource("/issues/{id}").route(web::get().to(get_issue)))
            .service(web::resource("/issues/{id}/status").route(web::patch().to(set_issue_status)))
            .service(web::resource("/profiles/pending").route(web::get().to(list_pending_profiles)))
            .service(web::resource("/profiles/{user_id}/approve").route(web::post().to(approve_profile))),
    );
}

#[derive(Clone)]
pub struct AppState { pub service: HostelService }

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogResponse {
    pub blocks: Vec<String>,
    pub floors: Vec<u8>,
    pub categories: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/catalog",
    responses((status = 200, description = "Blocks, floors and issue categories", body = CatalogResponse))
)]
pub async fn get_catalog(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let cfg = data.service.config();
    Ok(HttpResponse::Ok().json(CatalogResponse {
        blocks: cfg.blocks.clone(),
        floors: cfg.floors.clone(),
        categories: cfg.categories.clone(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "Caller's profile, created as pending on first call", body = UserProfile),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_my_profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = data.service.ensure_profile(auth.user_id(), auth.email()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    put,
    path = "/api/v1/profile/room",
    request_body = RoomDetails,
    responses(
        (status = 200, description = "Room details submitted for verification", body = UserProfile),
        (status = 400, description = "Invalid block or room"),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn submit_room_details(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<RoomDetails>,
) -> Result<HttpResponse, ApiError> {
    let profile = data.service.submit_room_details(auth.user_id(), &payload).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportRequest {
    pub floor: u8,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub is_urgent: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Created,
    Consolidated,
    AlreadyReported,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponse {
    pub outcome: OutcomeKind,
    pub issue_id: Id,
    pub reporter_count: Option<usize>,
    pub message: String,
}

impl From<ConsolidationOutcome> for ReportResponse {
    fn from(outcome: ConsolidationOutcome) -> Self {
        match outcome {
            ConsolidationOutcome::Created { issue_id } => ReportResponse {
                outcome: OutcomeKind::Created,
                issue_id,
                reporter_count: Some(1),
                message: "New issue created; the caretaker has been notified.".into(),
            },
            ConsolidationOutcome::Consolidated { issue_id, reporter_count } => ReportResponse {
                outcome: OutcomeKind::Consolidated,
                issue_id,
                reporter_count: Some(reporter_count),
                message: format!("Tagged the existing issue; it is now linked to {reporter_count} rooms."),
            },
            ConsolidationOutcome::AlreadyReported { issue_id } => ReportResponse {
                outcome: OutcomeKind::AlreadyReported,
                issue_id,
                reporter_count: None,
                message: "Your room has already reported this issue.".into(),
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = ReportRequest,
    responses(
        (status = 201, description = "New issue created", body = ReportResponse),
        (status = 200, description = "Merged into an open issue, or already reported by this room", body = ReportResponse),
        (status = 400, description = "Missing or unknown field"),
        (status = 403, description = "Profile not verified"),
        (status = 503, description = "Store unavailable or contention")
    )
)]
pub async fn submit_report(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<ReportRequest>,
) -> Result<HttpResponse, ApiError> {
    let profile = match data.service.get_profile(auth.user_id()).await {
        Ok(profile) => profile,
        Err(ServiceError::NotFound) => return Err(ApiError::Forbidden),
        Err(e) => return Err(e.into()),
    };
    // reports are filed against the verified room, never a self-declared one
    let Some((block, room)) = profile.assigned_room().filter(|_| profile.role == ProfileRole::Student) else {
        return Err(ApiError::Forbidden);
    };
    let req = payload.into_inner();
    let report = NewReport {
        block: Some(block.to_string()),
        floor: Some(req.floor),
        category: Some(req.category),
        description: Some(req.description),
        is_urgent: req.is_urgent,
        reporter_room: Some(room.to_string()),
        reporter_user_id: Some(profile.user_id.clone()),
    };
    let outcome = data.service.submit_report(report).await?;
    let created = matches!(outcome, ConsolidationOutcome::Created { .. });
    let body = ReportResponse::from(outcome);
    if created {
        Ok(HttpResponse::Created().json(body))
    } else {
        Ok(HttpResponse::Ok().json(body))
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueQuery {
    pub block: Option<String>,
    pub urgent: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/issues",
    params(
        ("block" = Option<String>, Query, description = "Restrict to one block"),
        ("urgent" = Option<bool>, Query, description = "Only urgent issues")
    ),
    responses(
        (status = 200, description = "Open issues, urgent first then oldest first", body = [Issue]),
        (status = 403, description = "Caretakers only")
    )
)]
pub async fn list_open_issues(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<IssueQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Caretaker | Role::Admin);
    let q = query.into_inner();
    let filter = IssueFilter { block: q.block, urgent_only: q.urgent.unwrap_or(false) };
    let issues = data.service.list_open_issues(&filter).await?;
    Ok(HttpResponse::Ok().json(issues))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}",
    params(("id" = String, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue", body = Issue),
        (status = 404, description = "Issue not found")
    )
)]
pub async fn get_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Caretaker | Role::Admin);
    let issue = data.service.get_issue(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(issue))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub status: IssueStatus,
}

#[utoipa::path(
    patch,
    path = "/api/v1/issues/{id}/status",
    request_body = StatusUpdate,
    params(("id" = String, Path, description = "Issue id")),
    responses(
        (status = 204, description = "Status updated"),
        (status = 403, description = "Caretakers only"),
        (status = 404, description = "Issue not found")
    )
)]
pub async fn set_issue_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdate>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Caretaker | Role::Admin);
    data.service.set_status(&path.into_inner(), payload.status).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/pending",
    responses(
        (status = 200, description = "Profiles awaiting verification, oldest first", body = [UserProfile]),
        (status = 403, description = "Caretakers only")
    )
)]
pub async fn list_pending_profiles(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Caretaker | Role::Admin);
    let pending = data.service.list_pending_profiles().await?;
    Ok(HttpResponse::Ok().json(pending))
}

#[utoipa::path(
    post,
    path = "/api/v1/profiles/{user_id}/approve",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Profile verified", body = UserProfile),
        (status = 400, description = "No room details to verify"),
        (status = 403, description = "Caretakers only"),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn approve_profile(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Caretaker | Role::Admin);
    let profile = data.service.get_profile(&path.into_inner()).await?;
    let verified = data.service.approve_user(&profile).await?;
    Ok(HttpResponse::Ok().json(verified))
}
