use thiserror::Error;

use crate::tracking::phase::BookingStatus;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackingError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Timed out waiting for a location fix")]
    AcquisitionTimeout,

    #[error("Location unavailable - check location permissions and GPS")]
    LocationUnavailable,

    #[error("Route computation failed: {0}")]
    RouteComputationFailed(String),

    #[error("Pickup code has expired, request a new code")]
    OtpExpired,

    #[error("Pickup code does not match")]
    OtpMismatch,

    #[error("No pickup code has been issued for this booking")]
    OtpNotIssued,

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking is {0}, driver location is not tracked")]
    NotTracking(BookingStatus),

    #[error("Pickup code can only be issued for accepted bookings (booking is {0})")]
    OtpNotAllowed(BookingStatus),

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Booking store error: {0}")]
    Store(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl TrackingError {
    /// Errors a human-facing layer should display; everything else is
    /// recovered locally.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            TrackingError::LocationUnavailable
                | TrackingError::OtpExpired
                | TrackingError::OtpMismatch
        )
    }
}

pub type TrackingResult<T> = Result<T, TrackingError>;
