use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tracking::booking::Booking;
use crate::tracking::delivery::OtpDelivery;
use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::otp::DEFAULT_PICKUP_OTP_TTL_SECS;
use crate::tracking::phase::BookingStatus;
use crate::tracking::Coordinate;

/// Authoritative booking record. Implementations must apply status and pickup
/// code changes through the [`Booking`] methods so the trip phase rules hold.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_booking(&self, id: Uuid) -> TrackingResult<Booking>;

    async fn update_driver_location(&self, id: Uuid, coordinate: Coordinate)
        -> TrackingResult<()>;

    /// Direct status change; `in_progress` is always rejected.
    async fn update_status(&self, id: Uuid, status: BookingStatus) -> TrackingResult<Booking>;

    /// Issue (or reissue) the pickup code and hand it to the delivery
    /// channel. Returns the expiry; the code itself never comes back.
    async fn generate_pickup_otp(&self, id: Uuid) -> TrackingResult<DateTime<Utc>>;

    /// Verify the code and start the trip atomically. Returns the updated
    /// booking on success.
    async fn verify_pickup_otp(&self, id: Uuid, code: &str) -> TrackingResult<Booking>;
}

/// Hands a freshly issued code to the delivery channel without blocking the
/// caller. Delivery failures are logged only.
pub fn dispatch_otp(delivery: Arc<dyn OtpDelivery>, booking_id: Uuid, phone: Option<String>, code: String) {
    let Some(phone) = phone else {
        tracing::warn!(booking_id = %booking_id, "No passenger phone, pickup code not delivered");
        return;
    };

    tokio::spawn(async move {
        if let Err(e) = delivery.send(&phone, &code).await {
            tracing::warn!(booking_id = %booking_id, error = %e, "Pickup code delivery failed");
        }
    });
}

/// Process-local store, used by tests and by embedders without a backend.
pub struct InMemoryBookingStore {
    bookings: Mutex<HashMap<Uuid, Booking>>,
    delivery: Arc<dyn OtpDelivery>,
    otp_ttl: Duration,
}

impl InMemoryBookingStore {
    pub fn new(delivery: Arc<dyn OtpDelivery>) -> Self {
        Self {
            bookings: Mutex::new(HashMap::new()),
            delivery,
            otp_ttl: Duration::seconds(DEFAULT_PICKUP_OTP_TTL_SECS),
        }
    }

    pub fn with_otp_ttl(mut self, ttl: Duration) -> Self {
        self.otp_ttl = ttl;
        self
    }

    pub async fn insert(&self, booking: Booking) {
        self.bookings.lock().await.insert(booking.id, booking);
    }

    pub async fn assign_driver(&self, id: Uuid, driver_id: Uuid) -> TrackingResult<Booking> {
        let mut bookings = self.bookings.lock().await;
        let booking = bookings.get_mut(&id).ok_or(TrackingError::BookingNotFound)?;
        booking.assign_driver(driver_id, Utc::now())?;
        Ok(booking.clone())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get_booking(&self, id: Uuid) -> TrackingResult<Booking> {
        self.bookings
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(TrackingError::BookingNotFound)
    }

    async fn update_driver_location(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> TrackingResult<()> {
        let mut bookings = self.bookings.lock().await;
        let booking = bookings.get_mut(&id).ok_or(TrackingError::BookingNotFound)?;
        booking.record_driver_location(coordinate, Utc::now())
    }

    async fn update_status(&self, id: Uuid, status: BookingStatus) -> TrackingResult<Booking> {
        let mut bookings = self.bookings.lock().await;
        let booking = bookings.get_mut(&id).ok_or(TrackingError::BookingNotFound)?;
        booking.set_status(status, Utc::now())?;
        tracing::info!(booking_id = %id, status = %status, "Booking status updated");
        Ok(booking.clone())
    }

    async fn generate_pickup_otp(&self, id: Uuid) -> TrackingResult<DateTime<Utc>> {
        let (otp, phone) = {
            let mut bookings = self.bookings.lock().await;
            let booking = bookings.get_mut(&id).ok_or(TrackingError::BookingNotFound)?;
            let otp = booking.issue_pickup_otp(&mut rand::thread_rng(), Utc::now(), self.otp_ttl)?;
            (otp, booking.passenger_phone.clone())
        };

        tracing::info!(booking_id = %id, expires_at = %otp.expires_at, "Pickup code issued");
        let expires_at = otp.expires_at;
        dispatch_otp(self.delivery.clone(), id, phone, otp.code);
        Ok(expires_at)
    }

    async fn verify_pickup_otp(&self, id: Uuid, code: &str) -> TrackingResult<Booking> {
        let mut bookings = self.bookings.lock().await;
        let booking = bookings.get_mut(&id).ok_or(TrackingError::BookingNotFound)?;
        match booking.verify_pickup_otp(code, Utc::now()) {
            Ok(()) => {
                tracing::info!(booking_id = %id, "Pickup verified, trip started");
                Ok(booking.clone())
            }
            Err(e) => {
                tracing::info!(booking_id = %id, error = %e, "Pickup code rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::booking::tests::sample_booking;

    /// Captures delivered codes so tests can play the passenger.
    #[derive(Default)]
    struct CapturingDelivery {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OtpDelivery for CapturingDelivery {
        async fn send(&self, phone_number: &str, code: &str) -> TrackingResult<()> {
            self.sent
                .lock()
                .await
                .push((phone_number.to_string(), code.to_string()));
            Ok(())
        }
    }

    async fn last_code(delivery: &CapturingDelivery) -> String {
        for _ in 0..50 {
            if let Some((_, code)) = delivery.sent.lock().await.last() {
                return code.clone();
            }
            tokio::task::yield_now().await;
        }
        panic!("no code delivered");
    }

    #[tokio::test]
    async fn test_pickup_flow_through_store() {
        let delivery = Arc::new(CapturingDelivery::default());
        let store = InMemoryBookingStore::new(delivery.clone());
        let mut booking = sample_booking();
        booking.passenger_phone = Some("+919800000000".to_string());
        let id = booking.id;
        store.insert(booking).await;
        store.assign_driver(id, Uuid::new_v4()).await.unwrap();

        let expires_at = store.generate_pickup_otp(id).await.unwrap();
        assert!(expires_at > Utc::now() + Duration::seconds(590));

        let code = last_code(&delivery).await;
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert_eq!(
            store.verify_pickup_otp(id, wrong).await,
            Err(TrackingError::OtpMismatch)
        );
        assert_eq!(
            store.get_booking(id).await.unwrap().status,
            BookingStatus::Accepted
        );

        let booking = store.verify_pickup_otp(id, &code).await.unwrap();
        assert_eq!(booking.status, BookingStatus::InProgress);
        assert!(booking.pickup_otp.is_none());
    }

    #[tokio::test]
    async fn test_update_status_cannot_start_trip() {
        let store = InMemoryBookingStore::new(Arc::new(crate::tracking::LogOtpDelivery));
        let booking = sample_booking();
        let id = booking.id;
        store.insert(booking).await;
        store.assign_driver(id, Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            store.update_status(id, BookingStatus::InProgress).await,
            Err(TrackingError::InvalidTransition { .. })
        ));
        assert_eq!(
            store.get_booking(id).await.unwrap().status,
            BookingStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_expired_code_through_store() {
        let delivery = Arc::new(CapturingDelivery::default());
        let store =
            InMemoryBookingStore::new(delivery.clone()).with_otp_ttl(Duration::seconds(-1));
        let mut booking = sample_booking();
        booking.passenger_phone = Some("+919800000000".to_string());
        let id = booking.id;
        store.insert(booking).await;
        store.assign_driver(id, Uuid::new_v4()).await.unwrap();

        store.generate_pickup_otp(id).await.unwrap();
        let code = last_code(&delivery).await;
        assert_eq!(
            store.verify_pickup_otp(id, &code).await,
            Err(TrackingError::OtpExpired)
        );
    }

    #[tokio::test]
    async fn test_missing_booking() {
        let store = InMemoryBookingStore::new(Arc::new(crate::tracking::LogOtpDelivery));
        assert_eq!(
            store.get_booking(Uuid::new_v4()).await,
            Err(TrackingError::BookingNotFound)
        );
    }
}
