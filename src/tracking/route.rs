use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tracking::booking::Booking;
use crate::tracking::coordinate::validate;
use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::phase::RouteTarget;
use crate::tracking::Coordinate;
use crate::utils::geo::equirectangular_distance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Encoded route geometry, opaque to this crate
    pub polyline: String,
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> TrackingResult<RouteResult>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Computed(RouteResult),
    /// One of the endpoints failed validation; no request was issued
    Skipped,
    Failed(TrackingError),
}

/// Validate both endpoints and ask the provider for a driving route.
pub async fn compute_route(
    provider: &dyn RoutingProvider,
    origin: Option<Coordinate>,
    destination: Option<Coordinate>,
) -> RouteOutcome {
    let (Some(origin), Some(destination)) = (origin, destination) else {
        return RouteOutcome::Skipped;
    };
    if !validate(Some(&origin)) || !validate(Some(&destination)) {
        tracing::debug!(?origin, ?destination, "Skipping route for invalid endpoint");
        return RouteOutcome::Skipped;
    }

    match provider.route(origin, destination).await {
        Ok(result) => RouteOutcome::Computed(result),
        Err(e) => {
            tracing::warn!(error = %e, "Route computation failed");
            RouteOutcome::Failed(e)
        }
    }
}

/// Static pickup to drop-off preview for a booking.
pub async fn route_preview(provider: &dyn RoutingProvider, booking: &Booking) -> RouteOutcome {
    compute_route(
        provider,
        Some(booking.pickup.coordinate),
        booking.dropoff.as_ref().map(|d| d.coordinate),
    )
    .await
}

/// A route computation the caller should dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub seq: u64,
    pub target: RouteTarget,
    pub origin: Coordinate,
    pub destination: Coordinate,
}

/// The route currently on display.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRoute {
    pub target: RouteTarget,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub result: RouteResult,
    /// Set when a newer computation failed and this result is being kept
    pub stale: bool,
}

/// Serializes live route computations for one booking. At most one request
/// is in flight; results whose sequence is no longer the latest are dropped.
#[derive(Debug, Clone)]
pub struct RouteTracker {
    min_move_m: f64,
    latest_seq: u64,
    in_flight: Option<u64>,
    pending: Option<RouteRequest>,
    current: Option<TrackedRoute>,
}

impl RouteTracker {
    pub fn new(min_move_m: f64) -> Self {
        Self {
            min_move_m,
            latest_seq: 0,
            in_flight: None,
            pending: None,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&TrackedRoute> {
        self.current.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Record a new input (position, target or destination change) and
    /// return its sequence number.
    pub fn observe(&mut self) -> u64 {
        self.latest_seq += 1;
        self.latest_seq
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    /// Plan a computation for the latest input. Returns the request to
    /// dispatch now, or `None` when it is skipped or queued behind the
    /// in-flight call.
    pub fn plan(
        &mut self,
        origin: Coordinate,
        target: RouteTarget,
        destination: Coordinate,
    ) -> Option<RouteRequest> {
        if !validate(Some(&origin)) || !validate(Some(&destination)) {
            tracing::debug!("Not routing from or to an invalid coordinate");
            return None;
        }

        if let Some(current) = &self.current {
            let same_leg = current.target == target && current.destination == destination;
            if same_leg
                && !current.stale
                && equirectangular_distance(&current.origin, &origin) < self.min_move_m
            {
                tracing::debug!(seq = self.latest_seq, "Driver barely moved, keeping route");
                return None;
            }
        }

        let request = RouteRequest {
            seq: self.latest_seq,
            target,
            origin,
            destination,
        };

        if self.in_flight.is_some() {
            self.pending = Some(request);
            return None;
        }

        self.in_flight = Some(request.seq);
        Some(request)
    }

    /// Apply a finished computation. Returns whether it was applied and the
    /// queued request to dispatch next, if any.
    pub fn complete(
        &mut self,
        request: &RouteRequest,
        outcome: TrackingResult<RouteResult>,
    ) -> (bool, Option<RouteRequest>) {
        if self.in_flight == Some(request.seq) {
            self.in_flight = None;
        }

        let applied = if request.seq != self.latest_seq {
            tracing::debug!(
                seq = request.seq,
                latest = self.latest_seq,
                "Discarding route for superseded sample"
            );
            false
        } else {
            match outcome {
                Ok(result) => {
                    self.current = Some(TrackedRoute {
                        target: request.target,
                        origin: request.origin,
                        destination: request.destination,
                        result,
                        stale: false,
                    });
                    true
                }
                Err(e) => {
                    tracing::warn!(seq = request.seq, error = %e, "Route failed, keeping last result");
                    if let Some(current) = self.current.as_mut() {
                        current.stale = true;
                    }
                    false
                }
            }
        };

        let next = match self.pending.take() {
            Some(pending) if pending.seq == self.latest_seq && self.in_flight.is_none() => {
                self.in_flight = Some(pending.seq);
                Some(pending)
            }
            _ => None,
        };

        (applied, next)
    }

    /// Forget the displayed route when the target switches.
    pub fn clear_for_target(&mut self, target: RouteTarget) {
        if self.current.as_ref().is_some_and(|c| c.target != target) {
            self.current = None;
        }
    }

    /// Abandon everything: late responses for earlier sequences are ignored.
    pub fn reset(&mut self) {
        self.observe();
        self.in_flight = None;
        self.pending = None;
        self.current = None;
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: String,
}

/// Driving routes from an OSRM-compatible HTTP endpoint.
#[derive(Clone)]
pub struct OsrmRoutingProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmRoutingProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RoutingProvider for OsrmRoutingProvider {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> TrackingResult<RouteResult> {
        // OSRM takes lng,lat pairs
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude
        );

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "polyline")])
            .send()
            .await
            .map_err(|e| TrackingError::RouteComputationFailed(e.to_string()))?
            .json::<OsrmResponse>()
            .await
            .map_err(|e| TrackingError::RouteComputationFailed(format!("Invalid response: {}", e)))?;

        parse_osrm(response)
    }
}

fn parse_osrm(response: OsrmResponse) -> TrackingResult<RouteResult> {
    if response.code != "Ok" {
        return Err(TrackingError::RouteComputationFailed(
            response.message.unwrap_or(response.code),
        ));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| TrackingError::RouteComputationFailed("No route found".to_string()))?;

    Ok(RouteResult {
        distance_meters: route.distance,
        duration_seconds: route.duration,
        polyline: route.geometry,
    })
}
