use std::time::Duration;

/// Tunables for a tracking session. Permission and connectivity flags are
/// carried here instead of being read from ambient device state.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Forward a sample once this much time has passed since the last one
    pub throttle_interval: Duration,
    /// Forward a sample once the device moved at least this far (meters)
    pub throttle_distance_m: f64,
    /// Cold GPS acquisition is slow, so the first fix gets a long timeout
    pub first_fix_timeout: Duration,
    pub first_fix_attempts: u32,
    /// Pause between first-fix attempts to let the receiver settle
    pub retry_delay: Duration,
    pub steady_timeout: Duration,
    /// Timeout for the one-shot fallback after a stream error
    pub fallback_timeout: Duration,
    /// Reverse-geocode refinement never holds a fix back longer than this
    pub refine_timeout: Duration,
    pub high_accuracy: bool,
    pub location_permission_granted: bool,
    pub online: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_secs(10),
            throttle_distance_m: 50.0,
            first_fix_timeout: Duration::from_secs(30),
            first_fix_attempts: 3,
            retry_delay: Duration::from_secs(2),
            steady_timeout: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(20),
            refine_timeout: Duration::from_secs(3),
            high_accuracy: true,
            location_permission_granted: true,
            online: true,
        }
    }
}
