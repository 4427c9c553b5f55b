use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::driver::{PickupOtpResponse, VerifyPickupOtpRequest};
use crate::handlers::BookingResponse;
use crate::tracking::{Booking, BookingStatus, BookingStore, Coordinate, TrackingError, TrackingResult};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operation {
    Location,
    Status(BookingStatus),
    IssueOtp,
    VerifyOtp,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Driver-side [`BookingStore`] that talks to the backend's `/api/driver`
/// routes with a bearer token.
#[derive(Clone)]
pub struct HttpBookingStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBookingStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, id: Uuid, suffix: &str) -> String {
        format!("{}/api/driver/bookings/{}{}", self.base_url, id, suffix)
    }

    /// Send the request. `Ok(Err(..))` carries a non-success status and the
    /// server's error message.
    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> TrackingResult<Result<reqwest::Response, (StatusCode, String)>> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TrackingError::Store(format!("Booking API unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response));
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Ok(Err((status, message)))
    }

    async fn rejection(&self, id: Uuid, op: Operation, status: StatusCode, message: String) -> TrackingError {
        if let Some(e) = classify_status(op, status, &message) {
            return e;
        }

        // 409: the booking moved on; read it back to name the phase
        let current = match self.get_booking(id).await {
            Ok(booking) => booking.status,
            Err(e) => return e,
        };
        match op {
            Operation::Location => TrackingError::NotTracking(current),
            Operation::IssueOtp => TrackingError::OtpNotAllowed(current),
            Operation::VerifyOtp if current == BookingStatus::Accepted => TrackingError::OtpNotIssued,
            Operation::VerifyOtp => TrackingError::InvalidTransition {
                from: current,
                to: BookingStatus::InProgress,
            },
            Operation::Status(to) => TrackingError::InvalidTransition { from: current, to },
        }
    }

    async fn read_booking(response: reqwest::Response) -> TrackingResult<Booking> {
        response
            .json::<BookingResponse>()
            .await
            .map(BookingResponse::into_booking)
            .map_err(|e| TrackingError::Store(format!("Invalid booking response: {}", e)))
    }
}

/// Maps every rejection except 409, which needs the current phase.
fn classify_status(op: Operation, status: StatusCode, message: &str) -> Option<TrackingError> {
    match status {
        StatusCode::CONFLICT => None,
        StatusCode::NOT_FOUND => Some(TrackingError::BookingNotFound),
        StatusCode::GONE => Some(TrackingError::OtpExpired),
        StatusCode::BAD_REQUEST if op == Operation::VerifyOtp => Some(TrackingError::OtpMismatch),
        StatusCode::BAD_REQUEST => Some(TrackingError::InvalidCoordinate(message.to_string())),
        _ => Some(TrackingError::Store(format!("{}: {}", status, message))),
    }
}

#[async_trait]
impl BookingStore for HttpBookingStore {
    async fn get_booking(&self, id: Uuid) -> TrackingResult<Booking> {
        match self.execute(self.client.get(self.url(id, ""))).await? {
            Ok(response) => Self::read_booking(response).await,
            Err((StatusCode::NOT_FOUND, _)) => Err(TrackingError::BookingNotFound),
            Err((status, message)) => Err(TrackingError::Store(format!("{}: {}", status, message))),
        }
    }

    async fn update_driver_location(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> TrackingResult<()> {
        let request = self.client.put(self.url(id, "/location")).json(&coordinate);
        match self.execute(request).await? {
            Ok(_) => Ok(()),
            Err((status, message)) => Err(self.rejection(id, Operation::Location, status, message).await),
        }
    }

    async fn update_status(&self, id: Uuid, status: BookingStatus) -> TrackingResult<Booking> {
        let suffix = match status {
            BookingStatus::Completed => "/complete",
            BookingStatus::Cancelled => "/cancel",
            other => {
                let current = self.get_booking(id).await?.status;
                return Err(TrackingError::InvalidTransition { from: current, to: other });
            }
        };

        match self.execute(self.client.post(self.url(id, suffix))).await? {
            Ok(response) => Self::read_booking(response).await,
            Err((code, message)) => Err(self.rejection(id, Operation::Status(status), code, message).await),
        }
    }

    async fn generate_pickup_otp(&self, id: Uuid) -> TrackingResult<DateTime<Utc>> {
        match self.execute(self.client.post(self.url(id, "/pickup-otp"))).await? {
            Ok(response) => response
                .json::<PickupOtpResponse>()
                .await
                .map(|body| body.expires_at)
                .map_err(|e| TrackingError::Store(format!("Invalid pickup code response: {}", e))),
            Err((StatusCode::TOO_MANY_REQUESTS, message)) => Err(TrackingError::Provider(message)),
            Err((status, message)) => Err(self.rejection(id, Operation::IssueOtp, status, message).await),
        }
    }

    async fn verify_pickup_otp(&self, id: Uuid, code: &str) -> TrackingResult<Booking> {
        let request = self
            .client
            .post(self.url(id, "/pickup-otp/verify"))
            .json(&VerifyPickupOtpRequest {
                code: code.to_string(),
            });
        match self.execute(request).await? {
            Ok(response) => Self::read_booking(response).await,
            Err((status, message)) => Err(self.rejection(id, Operation::VerifyOtp, status, message).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_strips_trailing_slash() {
        let store = HttpBookingStore::new(reqwest::Client::new(), "http://localhost:3000/", "t");
        let id = Uuid::nil();
        assert_eq!(
            store.url(id, "/pickup-otp/verify"),
            format!("http://localhost:3000/api/driver/bookings/{}/pickup-otp/verify", id)
        );
    }

    #[test]
    fn test_classify_rejections() {
        assert_eq!(
            classify_status(Operation::VerifyOtp, StatusCode::BAD_REQUEST, "Pickup code does not match"),
            Some(TrackingError::OtpMismatch)
        );
        assert_eq!(
            classify_status(Operation::VerifyOtp, StatusCode::GONE, "expired"),
            Some(TrackingError::OtpExpired)
        );
        assert!(matches!(
            classify_status(Operation::Location, StatusCode::BAD_REQUEST, "Invalid coordinate"),
            Some(TrackingError::InvalidCoordinate(_))
        ));
        assert_eq!(
            classify_status(Operation::Location, StatusCode::NOT_FOUND, "Booking not found"),
            Some(TrackingError::BookingNotFound)
        );
        assert_eq!(
            classify_status(Operation::Status(BookingStatus::Completed), StatusCode::CONFLICT, ""),
            None
        );
    }
}
