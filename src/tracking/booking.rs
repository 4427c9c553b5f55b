use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::otp::{OtpState, PickupOtp};
use crate::tracking::phase::{BookingStatus, RouteTarget};
use crate::tracking::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub coordinate: Coordinate,
    pub address: String,
}

/// Working copy of a booking. All status and pickup code changes go through
/// the methods below so the trip phase rules hold for every store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_phone: Option<String>,
    pub driver_id: Option<Uuid>,
    pub pickup: Place,
    pub dropoff: Option<Place>,
    pub status: BookingStatus,
    pub driver_location: Option<Coordinate>,
    pub driver_location_at: Option<DateTime<Utc>>,
    pub pickup_otp: Option<PickupOtp>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        id: Uuid,
        passenger_id: Uuid,
        pickup: Place,
        dropoff: Option<Place>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            passenger_id,
            passenger_phone: None,
            driver_id: None,
            pickup,
            dropoff,
            status: BookingStatus::Pending,
            driver_location: None,
            driver_location_at: None,
            pickup_otp: None,
            updated_at: now,
        }
    }

    /// The point live routing should aim at in the current phase
    pub fn target(&self) -> Option<(RouteTarget, Coordinate)> {
        match self.status.route_target()? {
            RouteTarget::Pickup => Some((RouteTarget::Pickup, self.pickup.coordinate)),
            RouteTarget::Dropoff => self
                .dropoff
                .as_ref()
                .map(|d| (RouteTarget::Dropoff, d.coordinate)),
        }
    }

    pub fn otp_state(&self, now: DateTime<Utc>) -> OtpState {
        match (&self.pickup_otp, self.status) {
            (Some(otp), _) => otp.state(now),
            (None, BookingStatus::InProgress | BookingStatus::Completed) => OtpState::Verified,
            (None, _) => OtpState::None,
        }
    }

    pub fn assign_driver(&mut self, driver_id: Uuid, now: DateTime<Utc>) -> TrackingResult<()> {
        self.status.check_transition(BookingStatus::Accepted)?;
        self.driver_id = Some(driver_id);
        self.status = BookingStatus::Accepted;
        self.updated_at = now;
        Ok(())
    }

    /// Direct status change. Starting the trip is rejected here; use
    /// [`Booking::verify_pickup_otp`].
    pub fn set_status(&mut self, next: BookingStatus, now: DateTime<Utc>) -> TrackingResult<()> {
        if next == BookingStatus::Accepted && self.driver_id.is_none() {
            return Err(TrackingError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status.check_transition(next)?;
        self.status = next;
        if next.is_terminal() {
            self.driver_location = None;
            self.driver_location_at = None;
            self.pickup_otp = None;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn record_driver_location(
        &mut self,
        coordinate: Coordinate,
        now: DateTime<Utc>,
    ) -> TrackingResult<()> {
        if !coordinate.is_valid() {
            return Err(TrackingError::InvalidCoordinate(format!(
                "({}, {})",
                coordinate.latitude, coordinate.longitude
            )));
        }
        if !self.status.tracks_driver() {
            return Err(TrackingError::NotTracking(self.status));
        }
        self.driver_location = Some(coordinate);
        self.driver_location_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Issue a fresh pickup code, replacing any outstanding one.
    pub fn issue_pickup_otp<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> TrackingResult<PickupOtp> {
        if self.status != BookingStatus::Accepted {
            return Err(TrackingError::OtpNotAllowed(self.status));
        }
        let otp = PickupOtp::generate(rng, now, ttl);
        self.pickup_otp = Some(otp.clone());
        self.updated_at = now;
        Ok(otp)
    }

    /// Verify the pickup code and start the trip in one step. On failure the
    /// booking is left untouched.
    pub fn verify_pickup_otp(&mut self, candidate: &str, now: DateTime<Utc>) -> TrackingResult<()> {
        if self.status != BookingStatus::Accepted {
            return Err(TrackingError::InvalidTransition {
                from: self.status,
                to: BookingStatus::InProgress,
            });
        }
        let otp = self.pickup_otp.as_ref().ok_or(TrackingError::OtpNotIssued)?;
        otp.verify(candidate, now)?;

        self.pickup_otp = None;
        self.status = BookingStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    pub(crate) fn sample_booking() -> Booking {
        Booking::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Place {
                coordinate: Coordinate {
                    latitude: 23.26,
                    longitude: 75.78,
                },
                address: "Rajwada, Indore".to_string(),
            },
            Some(Place {
                coordinate: Coordinate {
                    latitude: 22.7196,
                    longitude: 75.8577,
                },
                address: "Palasia, Indore".to_string(),
            }),
            t0(),
        )
    }

    fn accepted_booking() -> Booking {
        let mut booking = sample_booking();
        booking.assign_driver(Uuid::new_v4(), t0()).unwrap();
        booking
    }

    fn with_code(code: &str) -> Booking {
        let mut booking = accepted_booking();
        booking.pickup_otp = Some(PickupOtp {
            code: code.to_string(),
            expires_at: t0() + Duration::seconds(600),
        });
        booking
    }

    #[test]
    fn test_assign_driver_accepts_and_targets_pickup() {
        let booking = accepted_booking();
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert_eq!(
            booking.target(),
            Some((RouteTarget::Pickup, booking.pickup.coordinate))
        );
    }

    #[test]
    fn test_direct_start_rejected_without_otp() {
        let mut booking = accepted_booking();
        let before = booking.clone();
        assert!(matches!(
            booking.set_status(BookingStatus::InProgress, t0()),
            Err(TrackingError::InvalidTransition { .. })
        ));
        assert_eq!(booking, before);
    }

    #[test]
    fn test_accept_requires_driver() {
        let mut booking = sample_booking();
        assert!(booking.set_status(BookingStatus::Accepted, t0()).is_err());
    }

    #[test]
    fn test_mismatch_keeps_phase_then_correct_code_starts_trip() {
        let mut booking = with_code("482913");

        assert_eq!(
            booking.verify_pickup_otp("482914", t0() + Duration::seconds(30)),
            Err(TrackingError::OtpMismatch)
        );
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert!(booking.pickup_otp.is_some());

        booking
            .verify_pickup_otp("482913", t0() + Duration::seconds(60))
            .unwrap();
        assert_eq!(booking.status, BookingStatus::InProgress);
        assert!(booking.pickup_otp.is_none());
        assert_eq!(booking.otp_state(t0()), OtpState::Verified);
        assert_eq!(
            booking.target().map(|(target, _)| target),
            Some(RouteTarget::Dropoff)
        );
    }

    #[test]
    fn test_expired_code_keeps_phase() {
        let mut booking = with_code("482913");
        assert_eq!(
            booking.verify_pickup_otp("482913", t0() + Duration::seconds(601)),
            Err(TrackingError::OtpExpired)
        );
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert_eq!(
            booking.otp_state(t0() + Duration::seconds(601)),
            OtpState::Expired
        );
    }

    #[test]
    fn test_verify_without_code() {
        let mut booking = accepted_booking();
        assert_eq!(
            booking.verify_pickup_otp("123456", t0()),
            Err(TrackingError::OtpNotIssued)
        );
    }

    #[test]
    fn test_resend_replaces_code_and_resets_expiry() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut booking = accepted_booking();

        let first = booking
            .issue_pickup_otp(&mut rng, t0(), Duration::seconds(600))
            .unwrap();
        let later = t0() + Duration::seconds(300);
        let mut second = booking
            .issue_pickup_otp(&mut rng, later, Duration::seconds(600))
            .unwrap();
        while second.code == first.code {
            second = booking
                .issue_pickup_otp(&mut rng, later, Duration::seconds(600))
                .unwrap();
        }

        assert_eq!(second.expires_at, later + Duration::seconds(600));
        assert_eq!(
            booking.verify_pickup_otp(&first.code, later),
            Err(TrackingError::OtpMismatch)
        );
        assert!(booking.verify_pickup_otp(&second.code, later).is_ok());
    }

    #[test]
    fn test_issue_requires_accepted() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut booking = sample_booking();
        assert_eq!(
            booking.issue_pickup_otp(&mut rng, t0(), Duration::seconds(600)),
            Err(TrackingError::OtpNotAllowed(BookingStatus::Pending))
        );
    }

    #[test]
    fn test_completion_clears_driver_location() {
        let mut booking = with_code("482913");
        booking
            .record_driver_location(
                Coordinate {
                    latitude: 23.2601,
                    longitude: 75.7801,
                },
                t0(),
            )
            .unwrap();
        booking.verify_pickup_otp("482913", t0()).unwrap();
        booking.set_status(BookingStatus::Completed, t0()).unwrap();

        assert!(booking.driver_location.is_none());
        assert!(booking.target().is_none());
        assert_eq!(
            booking.record_driver_location(booking.pickup.coordinate, t0()),
            Err(TrackingError::NotTracking(BookingStatus::Completed))
        );
    }

    #[test]
    fn test_invalid_location_rejected() {
        let mut booking = accepted_booking();
        let result = booking.record_driver_location(
            Coordinate {
                latitude: f64::NAN,
                longitude: 75.0,
            },
            t0(),
        );
        assert!(matches!(result, Err(TrackingError::InvalidCoordinate(_))));
        assert!(booking.driver_location.is_none());
    }
}
