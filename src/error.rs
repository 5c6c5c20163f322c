use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Failures of the consolidation, triage and verification services.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("validation failed: {0}")] Validation(String),
    #[error("not found")] NotFound,
    #[error("store unavailable: {0}")] StoreUnavailable(#[source] StoreError),
    #[error("submission failed: {0}")] SubmissionFailed(#[source] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServiceError::NotFound,
            other => ServiceError::StoreUnavailable(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("forbidden")] Forbidden,
    #[error("not found")] NotFound,
    #[error("service unavailable")] Unavailable,
    #[error("internal error")] Internal,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::NotFound => ApiError::NotFound,
            ServiceError::StoreUnavailable(cause) | ServiceError::SubmissionFailed(cause) => {
                log::error!("store failure: {cause}");
                match cause {
                    StoreError::Malformed(_) => ApiError::Internal,
                    _ => ApiError::Unavailable,
                }
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
