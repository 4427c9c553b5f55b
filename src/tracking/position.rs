use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::tracking::config::TrackingConfig;
use crate::tracking::coordinate;
use crate::tracking::error::TrackingError;
use crate::tracking::refine::{PositionRefiner, Refinement};
use crate::tracking::throttle::LocationSample;
use crate::tracking::Coordinate;

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub timeout: Duration,
    pub high_accuracy: bool,
    /// Oldest cached fix the device may hand back
    pub maximum_age: Duration,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out waiting for a position")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// An active device subscription. Every watch handed out must be released
/// with [`LocationProvider::clear_watch`].
pub struct PositionWatch {
    pub id: WatchId,
    pub updates: mpsc::Receiver<Result<Coordinate, PositionError>>,
}

/// Device location API.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, options: PositionOptions) -> Result<Coordinate, PositionError>;

    async fn watch_position(&self, options: PositionOptions) -> Result<PositionWatch, PositionError>;

    fn clear_watch(&self, id: WatchId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Acquiring { attempt: u32 },
    Retrying { attempt: u32 },
    Streaming,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// A validated (and possibly refined) position
    Fix(LocationSample),
    /// Recoverable problem in the steady-state stream
    Degraded(TrackingError),
    /// Terminal: retries exhausted, permission missing, or the device stream ended
    Unavailable,
}

/// Owns the device location stream for one tracking session.
pub struct PositionAcquisition {
    provider: Arc<dyn LocationProvider>,
    refiner: Option<Arc<dyn PositionRefiner>>,
    config: TrackingConfig,
}

/// Control side of a running acquisition loop. Dropping it also tears the
/// loop down.
pub struct AcquisitionHandle {
    state: watch::Receiver<AcquisitionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.clone()
    }

    /// Stop the loop and wait until the device watch has been cleared.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Position acquisition task ended abnormally");
            }
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

enum Step<T> {
    Done(T),
    Shutdown,
}

impl PositionAcquisition {
    pub fn new(provider: Arc<dyn LocationProvider>, config: TrackingConfig) -> Self {
        Self {
            provider,
            refiner: None,
            config,
        }
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn PositionRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn start(self) -> (AcquisitionHandle, mpsc::Receiver<PositionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(AcquisitionState::Idle);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(self.run(events_tx, state_tx, shutdown_rx));

        let handle = AcquisitionHandle {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        (handle, events_rx)
    }

    fn options(&self, timeout: Duration) -> PositionOptions {
        PositionOptions {
            timeout,
            high_accuracy: self.config.high_accuracy,
            maximum_age: Duration::ZERO,
        }
    }

    async fn run(
        self,
        events: mpsc::Sender<PositionEvent>,
        state: watch::Sender<AcquisitionState>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        if !self.config.location_permission_granted {
            tracing::warn!("Location permission not granted, tracking unavailable");
            fail(&state, &events, &mut shutdown).await;
            return;
        }

        let first = tokio::select! {
            biased;
            _ = &mut shutdown => Step::Shutdown,
            fix = self.acquire_first_fix(&state) => Step::Done(fix),
        };
        match first {
            Step::Shutdown => {
                let _ = state.send(AcquisitionState::Idle);
                return;
            }
            Step::Done(Err(_)) => {
                fail(&state, &events, &mut shutdown).await;
                return;
            }
            Step::Done(Ok(fix)) => {
                if !self.emit(fix, &events, &mut shutdown).await {
                    let _ = state.send(AcquisitionState::Idle);
                    return;
                }
            }
        }

        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => Step::Shutdown,
            opened = self.provider.watch_position(self.options(self.config.steady_timeout)) => Step::Done(opened),
        };
        let mut subscription = match opened {
            Step::Shutdown => {
                let _ = state.send(AcquisitionState::Idle);
                return;
            }
            Step::Done(Err(e)) => {
                tracing::warn!(error = %e, "Could not subscribe to position updates");
                fail(&state, &events, &mut shutdown).await;
                return;
            }
            Step::Done(Ok(subscription)) => subscription,
        };

        let _ = state.send(AcquisitionState::Streaming);
        tracing::debug!(watch_id = subscription.id.0, "Position stream started");

        let mut failed = false;
        loop {
            let update = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                update = subscription.updates.recv() => update,
            };

            let delivered = match update {
                Some(Ok(raw)) => self.emit(raw, &events, &mut shutdown).await,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Position stream error, trying fallback fix");
                    let fallback = tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        fallback = self.fallback_fix() => fallback,
                    };
                    match fallback {
                        Ok(raw) => self.emit(raw, &events, &mut shutdown).await,
                        Err(e) => deliver(&events, PositionEvent::Degraded(e), &mut shutdown).await,
                    }
                }
                None => {
                    tracing::warn!("Device position stream closed");
                    failed = true;
                    break;
                }
            };

            if !delivered {
                break;
            }
        }

        self.provider.clear_watch(subscription.id);
        tracing::debug!(watch_id = subscription.id.0, "Position stream cleared");

        if failed {
            fail(&state, &events, &mut shutdown).await;
        } else {
            let _ = state.send(AcquisitionState::Idle);
        }
    }

    /// Cold start: long timeout, bounded attempts, short settle delay
    /// between attempts.
    async fn acquire_first_fix(
        &self,
        state: &watch::Sender<AcquisitionState>,
    ) -> Result<Coordinate, TrackingError> {
        let attempts = self.config.first_fix_attempts.max(1);
        let timeout = self.config.first_fix_timeout;

        for attempt in 1..=attempts {
            let _ = state.send(AcquisitionState::Acquiring { attempt });

            let outcome = tokio::time::timeout(
                timeout,
                self.provider.current_position(self.options(timeout)),
            )
            .await;

            match outcome {
                Ok(Ok(raw)) => match coordinate::accept(Some(raw), "first_fix") {
                    Some(fix) => return Ok(fix),
                    None => tracing::warn!(attempt, "First fix was not a valid coordinate"),
                },
                Ok(Err(PositionError::PermissionDenied)) => {
                    tracing::warn!("Location permission denied by device");
                    return Err(TrackingError::LocationUnavailable);
                }
                Ok(Err(e)) => tracing::warn!(attempt, error = %e, "First fix failed"),
                Err(_) => tracing::warn!(attempt, "First fix timed out"),
            }

            if attempt < attempts {
                let _ = state.send(AcquisitionState::Retrying { attempt });
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(TrackingError::LocationUnavailable)
    }

    async fn fallback_fix(&self) -> Result<Coordinate, TrackingError> {
        let timeout = self.config.fallback_timeout;
        match tokio::time::timeout(timeout, self.provider.current_position(self.options(timeout)))
            .await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(PositionError::Timeout)) | Err(_) => Err(TrackingError::AcquisitionTimeout),
            Ok(Err(e)) => Err(TrackingError::Provider(e.to_string())),
        }
    }

    /// Validate, refine, validate again, then publish. Returns false once
    /// nobody is listening any more or shutdown was requested.
    async fn emit(
        &self,
        raw: Coordinate,
        events: &mpsc::Sender<PositionEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> bool {
        let Some(raw) = coordinate::accept(Some(raw), "device") else {
            return true;
        };

        let mut sample = LocationSample::new(raw, Utc::now());
        if let Some(refinement) = self.refine(raw).await {
            if let Some(refined) = coordinate::accept(Some(refinement.coordinate), "refiner") {
                sample.coordinate = refined;
                sample.address = refinement.address;
            }
        }

        deliver(events, PositionEvent::Fix(sample), shutdown).await
    }

    async fn refine(&self, raw: Coordinate) -> Option<Refinement> {
        let refiner = self.refiner.as_ref()?;
        if !self.config.online {
            return None;
        }

        match tokio::time::timeout(self.config.refine_timeout, refiner.refine(raw)).await {
            Ok(Ok(refinement)) => refinement,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Refinement failed, using raw fix");
                None
            }
            Err(_) => {
                tracing::debug!("Refinement timed out, using raw fix");
                None
            }
        }
    }
}

/// Publish an event unless shutdown arrives first. A full buffer must never
/// keep the loop from seeing shutdown. Returns false when the loop should end.
async fn deliver(
    events: &mpsc::Sender<PositionEvent>,
    event: PositionEvent,
    shutdown: &mut oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

async fn fail(
    state: &watch::Sender<AcquisitionState>,
    events: &mpsc::Sender<PositionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) {
    let _ = state.send(AcquisitionState::Failed);
    deliver(events, PositionEvent::Unavailable, shutdown).await;
}
