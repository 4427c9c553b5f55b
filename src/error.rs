use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

use crate::tracking::TrackingError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            AppError::Gone(msg) => (StatusCode::GONE, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<TrackingError> for AppError {
    fn from(e: TrackingError) -> Self {
        let message = e.to_string();
        match e {
            TrackingError::InvalidCoordinate(_) | TrackingError::OtpMismatch => {
                AppError::BadRequest(message)
            }
            TrackingError::OtpExpired => AppError::Gone(message),
            TrackingError::OtpNotIssued
            | TrackingError::InvalidTransition { .. }
            | TrackingError::NotTracking(_)
            | TrackingError::OtpNotAllowed(_) => AppError::Conflict(message),
            TrackingError::BookingNotFound => AppError::NotFound(message),
            TrackingError::RouteComputationFailed(_) => AppError::Internal(message),
            TrackingError::AcquisitionTimeout
            | TrackingError::LocationUnavailable
            | TrackingError::Store(_)
            | TrackingError::Provider(_) => AppError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::BookingStatus;

    fn status_of(e: TrackingError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn test_tracking_errors_map_to_status_codes() {
        assert_eq!(status_of(TrackingError::OtpMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(TrackingError::OtpExpired), StatusCode::GONE);
        assert_eq!(status_of(TrackingError::BookingNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(TrackingError::InvalidTransition {
                from: BookingStatus::Accepted,
                to: BookingStatus::InProgress,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TrackingError::InvalidCoordinate("(91, 0)".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
