use axum::{
    extract::{Path, State},
    Json,
};
use sea_orm::EntityTrait;
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::handlers::BookingResponse;
use crate::tracking::{BookingStatus, BookingStore};
use crate::AppState;

/// List all bookings (admin), newest first
pub async fn list_all_bookings(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let bookings = state.store.list_all().await?;
    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

/// Assign a driver to a pending booking, which accepts it
pub async fn assign_driver(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> AppResult<Json<BookingResponse>> {
    let driver = user::Entity::find_by_id(payload.driver_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    if driver.role != UserRole::Driver {
        return Err(AppError::BadRequest("User is not a driver".to_string()));
    }

    let booking = state.store.assign_driver(booking_id, driver.id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

/// Generic status change (admin). Trips only start through pickup code
/// verification.
pub async fn update_status(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<BookingResponse>> {
    if payload.status == BookingStatus::InProgress {
        return Err(AppError::Conflict(
            "Trips start only when the driver verifies the pickup code".to_string(),
        ));
    }

    let booking = state
        .store
        .update_status(booking_id, payload.status)
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}
