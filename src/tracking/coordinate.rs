use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tracking::error::{TrackingError, TrackingResult};

/// A WGS84 position. Only construct through [`Coordinate::new`] or
/// [`Coordinate::from_json`] when the values come from outside the process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> TrackingResult<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(TrackingError::InvalidCoordinate(format!(
                "({}, {})",
                latitude, longitude
            )))
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Parse a coordinate delivered as loosely typed JSON (device bridge or
    /// server payload). Accepts `latitude`/`longitude` or `lat`/`lng` keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let latitude = object
            .get("latitude")
            .or_else(|| object.get("lat"))?
            .as_f64()?;
        let longitude = object
            .get("longitude")
            .or_else(|| object.get("lng"))?
            .as_f64()?;

        Self::new(latitude, longitude).ok()
    }
}

/// Returns false for a missing coordinate, non-finite components or
/// out-of-range values.
pub fn validate(coordinate: Option<&Coordinate>) -> bool {
    coordinate.is_some_and(Coordinate::is_valid)
}

/// Validate an externally observed coordinate, logging and dropping it when
/// it is malformed.
pub fn accept(coordinate: Option<Coordinate>, source: &str) -> Option<Coordinate> {
    match coordinate {
        Some(c) if c.is_valid() => Some(c),
        other => {
            tracing::debug!(source, coordinate = ?other, "Dropping invalid coordinate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_validate_accepts_in_range() {
        assert!(validate(Some(&c(23.26, 75.78))));
        assert!(validate(Some(&c(90.0, 180.0))));
        assert!(validate(Some(&c(-90.0, -180.0))));
        assert!(validate(Some(&c(0.0, 0.0))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_and_non_finite() {
        assert!(!validate(None));
        assert!(!validate(Some(&c(90.0001, 0.0))));
        assert!(!validate(Some(&c(-91.0, 0.0))));
        assert!(!validate(Some(&c(0.0, 180.5))));
        assert!(!validate(Some(&c(0.0, -181.0))));
        assert!(!validate(Some(&c(f64::NAN, 0.0))));
        assert!(!validate(Some(&c(0.0, f64::INFINITY))));
        assert!(!validate(Some(&c(f64::NEG_INFINITY, 10.0))));
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(Coordinate::new(23.26, 75.78).is_ok());
        assert!(matches!(
            Coordinate::new(120.0, 75.78),
            Err(TrackingError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            Coordinate::from_json(&json!({ "latitude": 23.26, "longitude": 75.78 })),
            Some(c(23.26, 75.78))
        );
        assert_eq!(
            Coordinate::from_json(&json!({ "lat": 23.26, "lng": 75.78 })),
            Some(c(23.26, 75.78))
        );
        assert_eq!(Coordinate::from_json(&json!(null)), None);
        assert_eq!(
            Coordinate::from_json(&json!({ "latitude": "23.26", "longitude": 75.78 })),
            None
        );
        assert_eq!(Coordinate::from_json(&json!({ "latitude": 23.26 })), None);
        assert_eq!(
            Coordinate::from_json(&json!({ "latitude": 95.0, "longitude": 75.78 })),
            None
        );
    }

    #[test]
    fn test_accept_drops_invalid() {
        assert_eq!(accept(Some(c(1.0, 2.0)), "test"), Some(c(1.0, 2.0)));
        assert_eq!(accept(Some(c(f64::NAN, 2.0)), "test"), None);
        assert_eq!(accept(None, "test"), None);
    }
}
