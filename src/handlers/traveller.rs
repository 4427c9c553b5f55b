use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::BookingResponse;
use crate::tracking::{route_preview, Booking, BookingStatus, BookingStore, RouteOutcome, RouteResult};
use crate::utils::jwt::Claims;
use crate::AppState;

async fn load_own(state: &AppState, claims: &Claims, booking_id: Uuid) -> AppResult<Booking> {
    let booking = state.store.get_booking(booking_id).await?;

    // Verify ownership
    if booking.passenger_id != claims.sub {
        return Err(AppError::Forbidden(
            "You can only access your own bookings".to_string(),
        ));
    }

    Ok(booking)
}

/// Booking snapshot, polled by the passenger's tracking view
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    let booking = load_own(&state, &claims, booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// Road route from pickup to drop-off, shown before the trip starts
pub async fn get_route_preview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<RouteResult>> {
    let booking = load_own(&state, &claims, booking_id).await?;

    match route_preview(state.routing.as_ref(), &booking).await {
        RouteOutcome::Computed(route) => Ok(Json(route)),
        RouteOutcome::Skipped => Err(AppError::NotFound(
            "Booking has no drop-off to route to".to_string(),
        )),
        RouteOutcome::Failed(e) => {
            tracing::warn!(booking_id = %booking_id, error = %e, "Route preview failed");
            Err(e.into())
        }
    }
}

/// Cancel a booking
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<BookingResponse>> {
    load_own(&state, &claims, booking_id).await?;
    let booking = state
        .store
        .update_status(booking_id, BookingStatus::Cancelled)
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}
