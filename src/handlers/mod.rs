pub mod admin;
pub mod driver;
pub mod traveller;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracking::{Booking, BookingStatus, Coordinate, Place};

/// Booking snapshot as served over HTTP. The pickup code itself never
/// leaves the backend; only its expiry does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: BookingStatus,
    pub pickup: Place,
    pub dropoff: Option<Place>,
    pub driver_location: Option<Coordinate>,
    pub driver_location_at: Option<DateTime<Utc>>,
    pub pickup_otp_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            passenger_id: b.passenger_id,
            driver_id: b.driver_id,
            status: b.status,
            pickup: b.pickup.clone(),
            dropoff: b.dropoff.clone(),
            driver_location: b.driver_location,
            driver_location_at: b.driver_location_at,
            pickup_otp_expires_at: b.pickup_otp.as_ref().map(|otp| otp.expires_at),
            updated_at: b.updated_at,
        }
    }
}

impl BookingResponse {
    /// Rebuild a client-side booking. The code is unknown here, so the
    /// pickup code slot stays empty.
    pub fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            passenger_id: self.passenger_id,
            passenger_phone: None,
            driver_id: self.driver_id,
            pickup: self.pickup,
            dropoff: self.dropoff,
            status: self.status,
            driver_location: self.driver_location,
            driver_location_at: self.driver_location_at,
            pickup_otp: None,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::booking::tests::{sample_booking, t0};
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_response_hides_pickup_code() {
        let mut booking = sample_booking();
        booking.assign_driver(Uuid::new_v4(), t0()).unwrap();
        let otp = booking
            .issue_pickup_otp(&mut StdRng::seed_from_u64(7), t0(), Duration::seconds(600))
            .unwrap();

        let response = BookingResponse::from(&booking);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains(&otp.code));
        assert_eq!(response.pickup_otp_expires_at, Some(otp.expires_at));

        let back = response.into_booking();
        assert!(back.pickup_otp.is_none());
        assert_eq!(back.status, BookingStatus::Accepted);
    }
}
