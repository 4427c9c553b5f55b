use serde::{Deserialize, Serialize};

use crate::tracking::coordinate::validate;
use crate::tracking::phase::BookingStatus;
use crate::tracking::Coordinate;
use crate::utils::geo::haversine_distance;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proximity {
    pub distance_meters: f64,
    /// Whether the driver got closer than the previous reading
    pub approaching: Option<bool>,
}

/// Straight-line distance in meters, or `None` when either point is invalid.
pub fn straight_line_distance(from: &Coordinate, to: &Coordinate) -> Option<f64> {
    if validate(Some(from)) && validate(Some(to)) {
        Some(haversine_distance(from, to))
    } else {
        None
    }
}

/// Driver to pickup distance, only meaningful before the passenger is on board.
#[derive(Debug, Clone, Default)]
pub struct ProximityCalculator {
    last_distance: Option<f64>,
}

impl ProximityCalculator {
    pub fn update(
        &mut self,
        status: BookingStatus,
        driver: &Coordinate,
        pickup: &Coordinate,
    ) -> Option<Proximity> {
        if !status.proximity_active() {
            self.reset();
            return None;
        }

        let distance = straight_line_distance(driver, pickup)?;
        let approaching = self.last_distance.map(|last| distance < last);
        self.last_distance = Some(distance);

        Some(Proximity {
            distance_meters: distance,
            approaching,
        })
    }

    pub fn reset(&mut self) {
        self.last_distance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_reports_decreasing_distance() {
        let pickup = c(23.26, 75.78);
        let mut calculator = ProximityCalculator::default();

        let far = calculator
            .update(BookingStatus::Accepted, &c(23.2550, 75.7750), &pickup)
            .unwrap();
        assert_eq!(far.approaching, None);

        let near = calculator
            .update(BookingStatus::Accepted, &c(23.2601, 75.7801), &pickup)
            .unwrap();
        assert!(near.distance_meters < far.distance_meters);
        assert_eq!(near.approaching, Some(true));
    }

    #[test]
    fn test_inactive_outside_accepted() {
        let pickup = c(23.26, 75.78);
        let mut calculator = ProximityCalculator::default();
        for status in [
            BookingStatus::Pending,
            BookingStatus::InProgress,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert!(calculator.update(status, &c(23.2601, 75.7801), &pickup).is_none());
        }
    }

    #[test]
    fn test_invalid_points() {
        assert_eq!(straight_line_distance(&c(f64::NAN, 0.0), &c(0.0, 0.0)), None);
        assert!(straight_line_distance(&c(0.0, 0.0), &c(0.0, 0.0)).is_some());
    }
}
