use async_trait::async_trait;
use serde::Deserialize;

use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::Coordinate;

/// Result of refining a raw fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub coordinate: Coordinate,
    pub address: Option<String>,
}

/// Best-effort improvement of a raw fix. Callers fall back to the raw fix on
/// `Ok(None)`, on error, and on timeout.
#[async_trait]
pub trait PositionRefiner: Send + Sync {
    async fn refine(&self, raw: Coordinate) -> TrackingResult<Option<Refinement>>;
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    lat: Option<String>,
    lon: Option<String>,
    display_name: Option<String>,
    error: Option<String>,
}

/// Snaps a fix to the nearest addressable place using a Nominatim-compatible
/// `/reverse` endpoint.
#[derive(Clone)]
pub struct ReverseGeocodeRefiner {
    client: reqwest::Client,
    base_url: String,
}

impl ReverseGeocodeRefiner {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PositionRefiner for ReverseGeocodeRefiner {
    async fn refine(&self, raw: Coordinate) -> TrackingResult<Option<Refinement>> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", raw.latitude.to_string()),
                ("lon", raw.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|e| TrackingError::Provider(format!("Reverse geocoding failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrackingError::Provider(format!("Reverse geocoding failed: {}", e)))?
            .json::<ReverseResponse>()
            .await
            .map_err(|e| TrackingError::Provider(format!("Invalid geocoder response: {}", e)))?;

        Ok(parse_reverse(response))
    }
}

fn parse_reverse(response: ReverseResponse) -> Option<Refinement> {
    if response.error.is_some() {
        return None;
    }
    let latitude = response.lat?.parse().ok()?;
    let longitude = response.lon?.parse().ok()?;
    let coordinate = Coordinate::new(latitude, longitude).ok()?;

    Some(Refinement {
        coordinate,
        address: response.display_name,
    })
}
