use async_trait::async_trait;

use crate::tracking::error::TrackingResult;

/// Out-of-band channel that hands a pickup code to the passenger.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn send(&self, phone_number: &str, code: &str) -> TrackingResult<()>;
}

/// Development channel: writes the code to the log instead of sending an SMS.
#[derive(Debug, Clone, Default)]
pub struct LogOtpDelivery;

#[async_trait]
impl OtpDelivery for LogOtpDelivery {
    async fn send(&self, phone_number: &str, code: &str) -> TrackingResult<()> {
        tracing::info!(phone = phone_number, code, "Pickup code (log delivery)");
        Ok(())
    }
}
