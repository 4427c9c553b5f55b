use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tracking::error::{TrackingError, TrackingResult};

/// Trip phase of a booking. `completed` and `cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "booking_status")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Which point the live route is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Pickup,
    Dropoff,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Driver position is tracked only while a driver is on the way or driving
    pub fn tracks_driver(&self) -> bool {
        matches!(self, BookingStatus::Accepted | BookingStatus::InProgress)
    }

    pub fn route_target(&self) -> Option<RouteTarget> {
        match self {
            BookingStatus::Accepted => Some(RouteTarget::Pickup),
            BookingStatus::InProgress => Some(RouteTarget::Dropoff),
            _ => None,
        }
    }

    pub fn proximity_active(&self) -> bool {
        *self == BookingStatus::Accepted
    }

    /// Validate a direct status change. `accepted -> in_progress` is never
    /// allowed here: it only happens through pickup code verification.
    pub fn check_transition(self, next: BookingStatus) -> TrackingResult<()> {
        use BookingStatus::*;

        let allowed = matches!(
            (self, next),
            (Pending, Accepted)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Accepted, Cancelled)
                | (InProgress, Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(TrackingError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
