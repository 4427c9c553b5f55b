use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::tracking::booking::Booking;
use crate::tracking::config::TrackingConfig;
use crate::tracking::coordinate;
use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::phase::{BookingStatus, RouteTarget};
use crate::tracking::position::{
    AcquisitionHandle, LocationProvider, PositionAcquisition, PositionEvent,
};
use crate::tracking::proximity::{Proximity, ProximityCalculator};
use crate::tracking::refine::PositionRefiner;
use crate::tracking::route::{RouteRequest, RouteResult, RouteTracker, RoutingProvider, TrackedRoute};
use crate::tracking::store::BookingStore;
use crate::tracking::throttle::{LocationSample, LocationThrottle, ThrottleGate};
use crate::tracking::Coordinate;

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Owns the device and pushes its position to the booking store
    Driver,
    /// Follows the driver through booking snapshots
    Passenger,
}

/// Everything a presentation layer needs to render live tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingView {
    pub booking_id: uuid::Uuid,
    pub status: BookingStatus,
    pub driver_location: Option<Coordinate>,
    pub target: Option<RouteTarget>,
    pub route: Option<TrackedRoute>,
    pub proximity: Option<Proximity>,
    pub pickup_code_expires_at: Option<DateTime<Utc>>,
    /// Set once location acquisition gave up; shown to the user
    pub location_error: Option<TrackingError>,
    pub active: bool,
}

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn BookingStore>,
    pub routing: Arc<dyn RoutingProvider>,
    /// Required for the driver role
    pub location: Option<Arc<dyn LocationProvider>>,
    pub refiner: Option<Arc<dyn PositionRefiner>>,
}

enum Command {
    Snapshot(Booking),
    RequestPickupCode(oneshot::Sender<TrackingResult<DateTime<Utc>>>),
    VerifyPickupCode(String, oneshot::Sender<TrackingResult<()>>),
    SetStatus(BookingStatus, oneshot::Sender<TrackingResult<()>>),
    Stop,
}

enum Step {
    Command(Option<Command>),
    Position(Option<PositionEvent>),
    Route(RouteRequest, TrackingResult<RouteResult>),
}

/// Live tracking for one booking on one device. All inputs are processed by
/// a single task, in arrival order.
pub struct TrackingSession {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<TrackingView>,
    task: Option<JoinHandle<()>>,
}

impl TrackingSession {
    pub fn start(
        booking: Booking,
        role: SessionRole,
        deps: SessionDeps,
        config: TrackingConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(TrackingView {
            booking_id: booking.id,
            status: booking.status,
            driver_location: None,
            target: None,
            route: None,
            proximity: None,
            pickup_code_expires_at: None,
            location_error: None,
            active: true,
        });

        tracing::info!(booking_id = %booking.id, ?role, status = %booking.status, "Tracking session started");

        let worker = SessionWorker {
            role,
            gate: ThrottleGate::new(LocationThrottle::new(
                config.throttle_interval,
                config.throttle_distance_m,
            )),
            routes: RouteTracker::new(config.throttle_distance_m),
            proximity: ProximityCalculator::default(),
            last_proximity: None,
            booking: booking.clone(),
            driver_position: None,
            acquisition: None,
            route_task: None,
            pickup_code_expires_at: None,
            location_error: None,
            deps,
            config,
            commands: commands_rx,
            route_tx,
            route_rx,
            view: view_tx,
        };

        let task = tokio::spawn(worker.run(booking));

        Self {
            commands: commands_tx,
            view: view_rx,
            task: Some(task),
        }
    }

    pub fn view(&self) -> watch::Receiver<TrackingView> {
        self.view.clone()
    }

    pub fn current(&self) -> TrackingView {
        self.view.borrow().clone()
    }

    /// Hand the session a fresh booking snapshot from the backend, e.g. after
    /// an admin cancellation.
    pub async fn refresh(&self, booking: Booking) {
        let _ = self.commands.send(Command::Snapshot(booking)).await;
    }

    /// Issue or reissue the pickup code. Returns its expiry.
    pub async fn request_pickup_code(&self) -> TrackingResult<DateTime<Utc>> {
        let (tx, rx) = oneshot::channel();
        self.call(Command::RequestPickupCode(tx), rx).await
    }

    /// Verify the pickup code. On success the published view already shows
    /// the trip in progress and routes to drop-off.
    pub async fn verify_pickup_code(&self, code: &str) -> TrackingResult<()> {
        let (tx, rx) = oneshot::channel();
        self.call(Command::VerifyPickupCode(code.to_string(), tx), rx)
            .await
    }

    pub async fn set_status(&self, status: BookingStatus) -> TrackingResult<()> {
        let (tx, rx) = oneshot::channel();
        self.call(Command::SetStatus(status, tx), rx).await
    }

    async fn call<T>(
        &self,
        command: Command,
        reply: oneshot::Receiver<TrackingResult<T>>,
    ) -> TrackingResult<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackingError::Store("Tracking session has stopped".to_string()))?;
        reply
            .await
            .map_err(|_| TrackingError::Store("Tracking session has stopped".to_string()))?
    }

    /// Tear down: cancel the device watch, abandon route computations and
    /// clear the displayed driver position.
    pub async fn stop(mut self) {
        let _ = self.commands.send(Command::Stop).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Tracking session task ended abnormally");
            }
        }
    }
}

struct Acquisition {
    handle: AcquisitionHandle,
    events: mpsc::Receiver<PositionEvent>,
}

struct SessionWorker {
    role: SessionRole,
    gate: ThrottleGate,
    routes: RouteTracker,
    proximity: ProximityCalculator,
    last_proximity: Option<Proximity>,
    booking: Booking,
    driver_position: Option<Coordinate>,
    acquisition: Option<Acquisition>,
    route_task: Option<JoinHandle<()>>,
    pickup_code_expires_at: Option<DateTime<Utc>>,
    location_error: Option<TrackingError>,
    deps: SessionDeps,
    config: TrackingConfig,
    commands: mpsc::Receiver<Command>,
    route_tx: mpsc::UnboundedSender<(RouteRequest, TrackingResult<RouteResult>)>,
    route_rx: mpsc::UnboundedReceiver<(RouteRequest, TrackingResult<RouteResult>)>,
    view: watch::Sender<TrackingView>,
}

async fn next_position(acquisition: &mut Option<Acquisition>) -> Option<PositionEvent> {
    match acquisition {
        Some(acquisition) => acquisition.events.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionWorker {
    async fn run(mut self, initial: Booking) {
        // Force the first snapshot through the full change path
        self.booking.status = BookingStatus::Pending;
        self.apply_snapshot(initial).await;

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = next_position(&mut self.acquisition) => Step::Position(event),
                Some((request, outcome)) = self.route_rx.recv() => Step::Route(request, outcome),
            };

            match step {
                Step::Command(None) | Step::Command(Some(Command::Stop)) => break,
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Position(Some(event)) => self.handle_position(event).await,
                Step::Position(None) => self.acquisition = None,
                Step::Route(request, outcome) => self.handle_route(request, outcome),
            }
        }

        self.teardown().await;
        tracing::info!(booking_id = %self.booking.id, "Tracking session stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Snapshot(booking) => self.apply_snapshot(booking).await,
            Command::RequestPickupCode(reply) => {
                let result = self.deps.store.generate_pickup_otp(self.booking.id).await;
                if let Ok(expires_at) = &result {
                    self.pickup_code_expires_at = Some(*expires_at);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            Command::VerifyPickupCode(code, reply) => {
                let result = match self.deps.store.verify_pickup_otp(self.booking.id, &code).await {
                    // Status flip and target switch land in the same published view
                    Ok(booking) => {
                        self.apply_snapshot(booking).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::SetStatus(status, reply) => {
                let result = match self.deps.store.update_status(self.booking.id, status).await {
                    Ok(booking) => {
                        self.apply_snapshot(booking).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Stop => {}
        }
    }

    async fn apply_snapshot(&mut self, booking: Booking) {
        if booking.id != self.booking.id {
            tracing::warn!(booking_id = %booking.id, "Ignoring snapshot for another booking");
            return;
        }

        let previous = std::mem::replace(&mut self.booking, booking);
        let status_changed = previous.status != self.booking.status;
        if status_changed {
            tracing::info!(
                booking_id = %self.booking.id,
                from = %previous.status,
                to = %self.booking.status,
                "Trip phase changed"
            );
            if self.booking.status != BookingStatus::Accepted {
                self.pickup_code_expires_at = None;
            }
        }

        let mut inputs_changed = previous.target() != self.booking.target();

        if self.role == SessionRole::Passenger {
            let reported = coordinate::accept(self.booking.driver_location, "snapshot");
            if reported != self.driver_position {
                self.driver_position = reported;
                inputs_changed = true;
            }
        }

        if status_changed {
            self.sync_tracking().await;
        }

        if self.booking.status.tracks_driver() && inputs_changed {
            self.routes.observe();
            if let Some((target, _)) = self.booking.target() {
                self.routes.clear_for_target(target);
            }
            self.update_proximity();
            self.replan();
        }

        self.publish();
    }

    /// Start or stop device tracking to match the trip phase.
    async fn sync_tracking(&mut self) {
        let status = self.booking.status;

        if status.is_terminal() || status == BookingStatus::Pending {
            self.stop_acquisition().await;
            self.abandon_routes();
            self.gate.reset();
            self.proximity.reset();
            self.last_proximity = None;
            self.driver_position = None;
            return;
        }

        if self.role == SessionRole::Driver
            && status.tracks_driver()
            && self.acquisition.is_none()
            && self.location_error.is_none()
        {
            self.start_acquisition();
        }
    }

    fn start_acquisition(&mut self) {
        let Some(provider) = self.deps.location.clone() else {
            tracing::warn!(booking_id = %self.booking.id, "No location provider for driver session");
            self.location_error = Some(TrackingError::LocationUnavailable);
            return;
        };

        let mut acquisition = PositionAcquisition::new(provider, self.config.clone());
        if let Some(refiner) = self.deps.refiner.clone() {
            acquisition = acquisition.with_refiner(refiner);
        }
        let (handle, events) = acquisition.start();
        self.acquisition = Some(Acquisition { handle, events });
    }

    async fn stop_acquisition(&mut self) {
        if let Some(mut acquisition) = self.acquisition.take() {
            // Unblock a loop parked on a full buffer, then wait for the watch
            // to be cleared
            acquisition.events.close();
            acquisition.handle.stop().await;
        }
    }

    async fn handle_position(&mut self, event: PositionEvent) {
        match event {
            PositionEvent::Fix(sample) => self.handle_fix(sample).await,
            PositionEvent::Degraded(e) => {
                tracing::warn!(booking_id = %self.booking.id, error = %e, "Location stream degraded");
            }
            PositionEvent::Unavailable => {
                tracing::warn!(booking_id = %self.booking.id, "Location unavailable");
                self.location_error = Some(TrackingError::LocationUnavailable);
                self.stop_acquisition().await;
                self.publish();
            }
        }
    }

    async fn handle_fix(&mut self, sample: LocationSample) {
        if !self.booking.status.tracks_driver() {
            tracing::debug!(booking_id = %self.booking.id, "Ignoring late position sample");
            return;
        }
        if !self.gate.offer(&sample) {
            return;
        }

        self.driver_position = Some(sample.coordinate);
        self.push_location(sample.coordinate).await;

        // The store may have reported a phase change that ended tracking
        if !self.booking.status.tracks_driver() {
            return;
        }

        self.routes.observe();
        self.update_proximity();
        self.replan();
        self.publish();
    }

    async fn push_location(&mut self, coordinate: Coordinate) {
        match self
            .deps
            .store
            .update_driver_location(self.booking.id, coordinate)
            .await
        {
            Ok(()) => {}
            Err(TrackingError::NotTracking(status)) => {
                tracing::info!(booking_id = %self.booking.id, %status, "Backend no longer tracking, refreshing booking");
                match self.deps.store.get_booking(self.booking.id).await {
                    Ok(booking) => self.apply_snapshot(booking).await,
                    Err(e) => tracing::warn!(error = %e, "Failed to refresh booking"),
                }
            }
            Err(e) => {
                tracing::warn!(booking_id = %self.booking.id, error = %e, "Failed to push driver location");
            }
        }
    }

    fn update_proximity(&mut self) {
        self.last_proximity = match self.driver_position {
            Some(driver) => {
                self.proximity
                    .update(self.booking.status, &driver, &self.booking.pickup.coordinate)
            }
            None => None,
        };
    }

    fn replan(&mut self) {
        let (Some(origin), Some((target, destination))) =
            (self.driver_position, self.booking.target())
        else {
            return;
        };

        if let Some(request) = self.routes.plan(origin, target, destination) {
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: RouteRequest) {
        tracing::debug!(booking_id = %self.booking.id, seq = request.seq, ?request.target, "Computing route");
        let routing = self.deps.routing.clone();
        let results = self.route_tx.clone();
        self.route_task = Some(tokio::spawn(async move {
            let outcome = routing.route(request.origin, request.destination).await;
            let _ = results.send((request, outcome));
        }));
    }

    fn handle_route(&mut self, request: RouteRequest, outcome: TrackingResult<RouteResult>) {
        let (applied, next) = self.routes.complete(&request, outcome);
        if let Some(next) = next {
            self.dispatch(next);
        }
        if applied {
            self.publish();
        }
    }

    fn abandon_routes(&mut self) {
        if let Some(task) = self.route_task.take() {
            task.abort();
        }
        self.routes.reset();
    }

    async fn teardown(&mut self) {
        self.stop_acquisition().await;
        self.abandon_routes();
        self.driver_position = None;
        self.proximity.reset();
        self.last_proximity = None;
        self.view.send_modify(|view| {
            view.active = false;
            view.driver_location = None;
            view.route = None;
            view.proximity = None;
        });
    }

    fn publish(&self) {
        let status = self.booking.status;
        let route = self
            .routes
            .current()
            .filter(|route| Some(route.target) == status.route_target())
            .cloned();

        self.view.send_replace(TrackingView {
            booking_id: self.booking.id,
            status,
            driver_location: self.driver_position,
            target: self.booking.target().map(|(target, _)| target),
            route,
            proximity: self.last_proximity,
            pickup_code_expires_at: self.pickup_code_expires_at,
            location_error: self.location_error.clone(),
            active: true,
        });
    }
}
