use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{booking, user};
use crate::tracking::store::dispatch_otp;
use crate::tracking::{
    Booking, BookingStatus, BookingStore, Coordinate, OtpDelivery, TrackingError, TrackingResult,
};

fn store_err(e: DbErr) -> TrackingError {
    TrackingError::Store(e.to_string())
}

/// Postgres-backed booking store. Each mutation locks the row, runs the
/// domain method and writes the result back in one transaction.
pub struct SeaOrmBookingStore {
    db: DatabaseConnection,
    delivery: Arc<dyn OtpDelivery>,
    otp_ttl: Duration,
}

impl SeaOrmBookingStore {
    pub fn new(db: DatabaseConnection, delivery: Arc<dyn OtpDelivery>, otp_ttl: Duration) -> Self {
        Self {
            db,
            delivery,
            otp_ttl,
        }
    }

    async fn lock(txn: &DatabaseTransaction, id: Uuid) -> TrackingResult<booking::Model> {
        booking::Entity::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(store_err)?
            .ok_or(TrackingError::BookingNotFound)
    }

    async fn save(
        txn: DatabaseTransaction,
        model: booking::Model,
        domain: &Booking,
    ) -> TrackingResult<()> {
        let mut active = model.into_active_model();
        booking::apply_domain(&mut active, domain);
        active.update(&txn).await.map_err(store_err)?;
        txn.commit().await.map_err(store_err)
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> TrackingResult<Booking>
    where
        F: FnOnce(&mut Booking) -> TrackingResult<()> + Send,
    {
        let txn = self.db.begin().await.map_err(store_err)?;
        let model = Self::lock(&txn, id).await?;

        let mut domain = model.to_domain();
        // Dropping the transaction on error rolls it back.
        apply(&mut domain)?;

        Self::save(txn, model, &domain).await?;
        Ok(domain)
    }

    pub async fn list_all(&self) -> TrackingResult<Vec<Booking>> {
        let rows = booking::Entity::find()
            .order_by_desc(booking::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?;
        Ok(rows.iter().map(booking::Model::to_domain).collect())
    }

    pub async fn list_for_driver(&self, driver_id: Uuid) -> TrackingResult<Vec<Booking>> {
        let rows = booking::Entity::find()
            .filter(booking::Column::DriverId.eq(driver_id))
            .order_by_desc(booking::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?;
        Ok(rows.iter().map(booking::Model::to_domain).collect())
    }

    /// `pending -> accepted` with the given driver.
    pub async fn assign_driver(&self, id: Uuid, driver_id: Uuid) -> TrackingResult<Booking> {
        let booking = self
            .mutate(id, |b| b.assign_driver(driver_id, Utc::now()))
            .await?;
        tracing::info!(booking_id = %id, driver_id = %driver_id, "Driver assigned");
        Ok(booking)
    }
}

#[async_trait]
impl BookingStore for SeaOrmBookingStore {
    async fn get_booking(&self, id: Uuid) -> TrackingResult<Booking> {
        booking::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(|m| m.to_domain())
            .ok_or(TrackingError::BookingNotFound)
    }

    async fn update_driver_location(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> TrackingResult<()> {
        self.mutate(id, |b| b.record_driver_location(coordinate, Utc::now()))
            .await?;
        tracing::debug!(booking_id = %id, "Driver location stored");
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: BookingStatus) -> TrackingResult<Booking> {
        let booking = self
            .mutate(id, |b| b.set_status(status, Utc::now()))
            .await
            .inspect_err(|e| {
                tracing::warn!(booking_id = %id, status = %status, error = %e, "Status change rejected");
            })?;
        tracing::info!(booking_id = %id, status = %status, "Booking status updated");
        Ok(booking)
    }

    async fn generate_pickup_otp(&self, id: Uuid) -> TrackingResult<DateTime<Utc>> {
        let txn = self.db.begin().await.map_err(store_err)?;
        let model = Self::lock(&txn, id).await?;

        // Resolve the recipient before the old code is replaced
        let phone = user::Entity::find_by_id(model.passenger_id)
            .one(&txn)
            .await
            .map_err(store_err)?
            .and_then(|u| u.phone);

        let mut domain = model.to_domain();
        let otp = domain.issue_pickup_otp(&mut rand::thread_rng(), Utc::now(), self.otp_ttl)?;
        Self::save(txn, model, &domain).await?;

        tracing::info!(booking_id = %id, expires_at = %otp.expires_at, "Pickup code issued");
        let expires_at = otp.expires_at;
        dispatch_otp(self.delivery.clone(), id, phone, otp.code);
        Ok(expires_at)
    }

    async fn verify_pickup_otp(&self, id: Uuid, code: &str) -> TrackingResult<Booking> {
        match self.mutate(id, |b| b.verify_pickup_otp(code, Utc::now())).await {
            Ok(booking) => {
                tracing::info!(booking_id = %id, "Pickup verified, trip started");
                Ok(booking)
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
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use tokio::sync::Mutex;

    use crate::entities::user::UserRole;

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

    fn accepted_row(passenger_id: Uuid) -> booking::Model {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        booking::Model {
            id: Uuid::new_v4(),
            passenger_id,
            driver_id: Some(Uuid::new_v4()),
            pickup_lat: 23.26,
            pickup_lng: 75.78,
            pickup_address: "Rajwada, Indore".to_string(),
            dropoff_lat: Some(22.7196),
            dropoff_lng: Some(75.8577),
            dropoff_address: Some("Palasia, Indore".to_string()),
            status: BookingStatus::Accepted,
            driver_lat: None,
            driver_lng: None,
            driver_location_at: None,
            pickup_otp_code: Some("111111".to_string()),
            pickup_otp_expires_at: Some((Utc::now() + Duration::seconds(300)).into()),
            created_at: t0.into(),
            updated_at: t0.into(),
        }
    }

    #[tokio::test]
    async fn test_phone_lookup_failure_keeps_previous_code() {
        let row = accepted_row(Uuid::new_v4());
        let id = row.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .append_query_errors([DbErr::Custom("connection reset".to_string())])
            .into_connection();
        let delivery = Arc::new(CapturingDelivery::default());
        let store = SeaOrmBookingStore::new(db.clone(), delivery.clone(), Duration::seconds(600));

        let result = store.generate_pickup_otp(id).await;
        assert!(matches!(result, Err(TrackingError::Store(_))));

        tokio::task::yield_now().await;
        assert!(delivery.sent.lock().await.is_empty());

        drop(store);
        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("UPDATE"));
    }

    #[tokio::test]
    async fn test_issued_code_goes_to_passenger_phone() {
        let passenger_id = Uuid::new_v4();
        let row = accepted_row(passenger_id);
        let id = row.id;
        let passenger = user::Model {
            id: passenger_id,
            name: "Asha".to_string(),
            phone: Some("+919800000000".to_string()),
            role: UserRole::Traveller,
            created_at: row.created_at,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row.clone()]])
            .append_query_results([vec![passenger]])
            .append_query_results([vec![row]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let delivery = Arc::new(CapturingDelivery::default());
        let store = SeaOrmBookingStore::new(db, delivery.clone(), Duration::seconds(600));

        let expires_at = store.generate_pickup_otp(id).await.unwrap();
        assert!(expires_at > Utc::now() + Duration::seconds(590));

        for _ in 0..50 {
            if !delivery.sent.lock().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = delivery.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+919800000000");
        assert_eq!(sent[0].1.len(), 6);
    }
}
