use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, GovernorError, GovernorLayer};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Type alias for the global governor layer (IP-based rate limiting)
pub type GlobalGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

/// Create a GovernorLayer for global rate limiting (per IP address)
/// - 1000 requests per minute (one token every 60ms)
/// - Applied before authentication to protect against DDoS
pub fn create_global_governor() -> GlobalGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60) // One token every 60ms (1000 per minute)
            .burst_size(1000)    // Max capacity of the "window"
            .finish()
            .unwrap(),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}

/// Render governor rejections with the same `{ "error": .. }` body as every
/// other failure.
pub fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, .. } => AppError::TooManyRequests(format!(
            "Too many requests, retry in {} seconds",
            wait_time
        ))
        .into_response(),
        GovernorError::UnableToExtractKey => {
            AppError::Unauthorized("No authentication found".to_string()).into_response()
        }
        other => {
            AppError::Internal(format!("Rate limiter failure: {:?}", other)).into_response()
        }
    }
}

/// Per-booking limiter for pickup code (re)issuance.
pub type OtpResendLimiter = DefaultKeyedRateLimiter<Uuid>;

/// `burst` codes back to back, then one every `cooldown`.
pub fn create_otp_resend_limiter(cooldown: Duration, burst: u32) -> Arc<OtpResendLimiter> {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(cooldown)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

pub fn check_otp_resend(limiter: &OtpResendLimiter, booking_id: Uuid) -> AppResult<()> {
    limiter.check_key(&booking_id).map_err(|not_until| {
        let wait = not_until.wait_time_from(DefaultClock::default().now());
        tracing::warn!(booking_id = %booking_id, wait_secs = wait.as_secs(), "Pickup code resend throttled");
        AppError::TooManyRequests(format!(
            "A pickup code was just sent, try again in {} seconds",
            wait.as_secs().max(1)
        ))
    })
}

/// Middleware to log rate limiting and request details
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!(
        client_ip = %addr.ip(),
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            "RATE LIMITED - Request rejected due to too many requests"
        );
    } else if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            status = %status,
            "Request failed"
        );
    } else {
        tracing::debug!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            status = %status,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_resend_burst_then_cooldown() {
        let limiter = create_otp_resend_limiter(Duration::from_secs(30), 3);
        let booking = Uuid::new_v4();

        for _ in 0..3 {
            assert!(check_otp_resend(&limiter, booking).is_ok());
        }
        assert!(matches!(
            check_otp_resend(&limiter, booking),
            Err(AppError::TooManyRequests(_))
        ));

        // Other bookings have their own bucket
        assert!(check_otp_resend(&limiter, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_zero_burst_still_allows_one() {
        let limiter = create_otp_resend_limiter(Duration::from_secs(30), 0);
        let booking = Uuid::new_v4();
        assert!(check_otp_resend(&limiter, booking).is_ok());
        assert!(check_otp_resend(&limiter, booking).is_err());
    }
}
