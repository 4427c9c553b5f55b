use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::tracking::{Booking, BookingStatus, Coordinate, PickupOtp, Place};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "booking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_address: String,
    pub dropoff_lat: Option<f64>,
    pub dropoff_lng: Option<f64>,
    pub dropoff_address: Option<String>,
    pub status: BookingStatus,
    pub driver_lat: Option<f64>,
    pub driver_lng: Option<f64>,
    pub driver_location_at: Option<DateTimeWithTimeZone>,
    #[serde(skip_serializing)]
    pub pickup_otp_code: Option<String>,
    pub pickup_otp_expires_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::PassengerId",
        to = "super::user::Column::Id"
    )]
    Passenger,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id"
    )]
    Driver,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Passenger.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Rebuild the domain booking. Stored coordinates that no longer validate
    /// are dropped. The passenger phone lives on the user row and is left
    /// empty here.
    pub fn to_domain(&self) -> Booking {
        let dropoff = match (self.dropoff_lat, self.dropoff_lng) {
            (Some(lat), Some(lng)) => Some(Place {
                coordinate: Coordinate {
                    latitude: lat,
                    longitude: lng,
                },
                address: self.dropoff_address.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        let driver_location = match (self.driver_lat, self.driver_lng) {
            (Some(lat), Some(lng)) => Coordinate::new(lat, lng).ok(),
            _ => None,
        };

        let pickup_otp = match (&self.pickup_otp_code, self.pickup_otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(PickupOtp {
                code: code.clone(),
                expires_at: expires_at.with_timezone(&Utc),
            }),
            _ => None,
        };

        Booking {
            id: self.id,
            passenger_id: self.passenger_id,
            passenger_phone: None,
            driver_id: self.driver_id,
            pickup: Place {
                coordinate: Coordinate {
                    latitude: self.pickup_lat,
                    longitude: self.pickup_lng,
                },
                address: self.pickup_address.clone(),
            },
            dropoff,
            status: self.status,
            driver_location,
            driver_location_at: self.driver_location_at.map(|t| t.with_timezone(&Utc)),
            pickup_otp,
            updated_at: self.updated_at.with_timezone(&Utc),
        }
    }
}

/// Copy the fields the tracking core may change back onto the row.
pub fn apply_domain(active: &mut ActiveModel, booking: &Booking) {
    active.driver_id = Set(booking.driver_id);
    active.status = Set(booking.status);
    active.driver_lat = Set(booking.driver_location.map(|c| c.latitude));
    active.driver_lng = Set(booking.driver_location.map(|c| c.longitude));
    active.driver_location_at = Set(booking.driver_location_at.map(Into::into));
    active.pickup_otp_code = Set(booking.pickup_otp.as_ref().map(|otp| otp.code.clone()));
    active.pickup_otp_expires_at = Set(booking.pickup_otp.as_ref().map(|otp| otp.expires_at.into()));
    active.updated_at = Set(booking.updated_at.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn model() -> Model {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Model {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_id: Some(Uuid::new_v4()),
            pickup_lat: 23.26,
            pickup_lng: 75.78,
            pickup_address: "Rajwada".to_string(),
            dropoff_lat: Some(22.7196),
            dropoff_lng: None,
            dropoff_address: None,
            status: BookingStatus::Accepted,
            driver_lat: Some(123.0),
            driver_lng: Some(75.78),
            driver_location_at: Some(t0.into()),
            pickup_otp_code: Some("482913".to_string()),
            pickup_otp_expires_at: Some((t0 + Duration::seconds(600)).into()),
            created_at: t0.into(),
            updated_at: t0.into(),
        }
    }

    #[test]
    fn test_to_domain_drops_partial_and_invalid_points() {
        let booking = model().to_domain();
        assert!(booking.dropoff.is_none());
        assert!(booking.driver_location.is_none());
        assert_eq!(booking.pickup_otp.as_ref().map(|o| o.code.as_str()), Some("482913"));
        assert_eq!(booking.status, BookingStatus::Accepted);
    }
}
