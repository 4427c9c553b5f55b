use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::BookingResponse;
use crate::middleware::rate_limit::{check_otp_resend, OtpResendLimiter};
use crate::tracking::{Booking, BookingStatus, BookingStore, Coordinate, TrackingError};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Load a booking and make sure it is assigned to the calling driver
async fn load_assigned(state: &AppState, claims: &Claims, booking_id: Uuid) -> AppResult<Booking> {
    let booking = state.store.get_booking(booking_id).await?;

    if booking.driver_id != Some(claims.sub) {
        return Err(AppError::Forbidden(
            "You are not assigned to this booking".to_string(),
        ));
    }

    Ok(booking)
}

/// List bookings assigned to the logged-in driver
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let bookings = state.store.list_for_driver(claims.sub).await?;
    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    let booking = load_assigned(&state, &claims, booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// Push the driver's current position
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
    Json(position): Json<Coordinate>,
) -> AppResult<Json<serde_json::Value>> {
    load_assigned(&state, &claims, booking_id).await?;
    state
        .store
        .update_driver_location(booking_id, position)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Location updated" })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PickupOtpResponse {
    pub expires_at: DateTime<Utc>,
}

/// Only accepted bookings may spend a resend token; anything else is turned
/// away before touching the limiter.
fn admit_pickup_otp(limiter: &OtpResendLimiter, booking: &Booking) -> AppResult<()> {
    if booking.status != BookingStatus::Accepted {
        return Err(TrackingError::OtpNotAllowed(booking.status).into());
    }
    check_otp_resend(limiter, booking.id)
}

/// Issue (or resend) the pickup code to the passenger
pub async fn request_pickup_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<PickupOtpResponse>> {
    let booking = load_assigned(&state, &claims, booking_id).await?;
    admit_pickup_otp(&state.otp_limiter, &booking)?;

    let expires_at = state.store.generate_pickup_otp(booking_id).await?;
    Ok(Json(PickupOtpResponse { expires_at }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPickupOtpRequest {
    pub code: String,
}

/// Check the code the passenger read out and start the trip
pub async fn verify_pickup_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<VerifyPickupOtpRequest>,
) -> AppResult<Json<BookingResponse>> {
    load_assigned(&state, &claims, booking_id).await?;

    if payload.code.trim().is_empty() {
        return Err(AppError::BadRequest("Pickup code is required".to_string()));
    }

    let booking = state
        .store
        .verify_pickup_otp(booking_id, &payload.code)
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// Finish the trip at the drop-off
pub async fn complete_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    load_assigned(&state, &claims, booking_id).await?;
    let booking = state
        .store
        .update_status(booking_id, BookingStatus::Completed)
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    load_assigned(&state, &claims, booking_id).await?;
    let booking = state
        .store
        .update_status(booking_id, BookingStatus::Cancelled)
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::middleware::rate_limit::create_otp_resend_limiter;
    use crate::tracking::booking::tests::{sample_booking, t0};

    #[test]
    fn test_wrong_phase_does_not_spend_resend_tokens() {
        let limiter = create_otp_resend_limiter(Duration::from_secs(30), 3);
        let mut booking = sample_booking();

        for _ in 0..5 {
            assert!(matches!(
                admit_pickup_otp(&limiter, &booking),
                Err(AppError::Conflict(_))
            ));
        }

        booking.assign_driver(Uuid::new_v4(), t0()).unwrap();
        for _ in 0..3 {
            assert!(admit_pickup_otp(&limiter, &booking).is_ok());
        }
        assert!(matches!(
            admit_pickup_otp(&limiter, &booking),
            Err(AppError::TooManyRequests(_))
        ));
    }
}
