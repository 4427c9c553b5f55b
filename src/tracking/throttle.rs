use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::Coordinate;
use crate::utils::geo::equirectangular_distance;

/// A single observed position. Never persisted as-is; only the latest
/// forwarded sample survives as the booking's driver location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub observed_at: DateTime<Utc>,
    /// Display address from reverse geocoding, when refinement succeeded
    pub address: Option<String>,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, observed_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            observed_at,
            address: None,
        }
    }
}

/// Decides whether a sample moved far enough, or arrived late enough, to be
/// worth forwarding.
#[derive(Debug, Clone)]
pub struct LocationThrottle {
    min_interval: chrono::Duration,
    min_distance_m: f64,
}

impl Default for LocationThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 50.0)
    }
}

impl LocationThrottle {
    pub fn new(min_interval: Duration, min_distance_m: f64) -> Self {
        Self {
            min_interval: chrono::Duration::from_std(min_interval)
                .unwrap_or(chrono::Duration::MAX),
            min_distance_m,
        }
    }

    pub fn min_distance_m(&self) -> f64 {
        self.min_distance_m
    }

    pub fn should_forward(
        &self,
        previous: Option<&LocationSample>,
        candidate: &LocationSample,
    ) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        if candidate.observed_at - previous.observed_at >= self.min_interval {
            return true;
        }

        equirectangular_distance(&previous.coordinate, &candidate.coordinate)
            >= self.min_distance_m
    }
}

/// Stateful wrapper remembering the last forwarded sample.
#[derive(Debug, Clone, Default)]
pub struct ThrottleGate {
    throttle: LocationThrottle,
    last_forwarded: Option<LocationSample>,
}

impl ThrottleGate {
    pub fn new(throttle: LocationThrottle) -> Self {
        Self {
            throttle,
            last_forwarded: None,
        }
    }

    /// Returns true and records the sample when it should be forwarded.
    pub fn offer(&mut self, candidate: &LocationSample) -> bool {
        if self
            .throttle
            .should_forward(self.last_forwarded.as_ref(), candidate)
        {
            self.last_forwarded = Some(candidate.clone());
            true
        } else {
            tracing::debug!(
                latitude = candidate.coordinate.latitude,
                longitude = candidate.coordinate.longitude,
                "Throttled location sample"
            );
            false
        }
    }

    pub fn last_forwarded(&self) -> Option<&LocationSample> {
        self.last_forwarded.as_ref()
    }

    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }
}
