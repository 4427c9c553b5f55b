use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tracking::error::{TrackingError, TrackingResult};

pub const PICKUP_OTP_DIGITS: usize = 6;
pub const DEFAULT_PICKUP_OTP_TTL_SECS: i64 = 600;

/// Outstanding pickup confirmation code. Exists only between issuance and
/// successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Where a booking stands in the pickup confirmation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpState {
    None,
    Sent,
    Expired,
    Verified,
}

impl PickupOtp {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let value: u32 = rng.gen_range(0..1_000_000);
        Self {
            code: format!("{:06}", value),
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Expiry wins over correctness: an expired code fails with
    /// `OtpExpired` even when the candidate matches.
    pub fn verify(&self, candidate: &str, now: DateTime<Utc>) -> TrackingResult<()> {
        if self.is_expired(now) {
            return Err(TrackingError::OtpExpired);
        }

        if codes_match(&self.code, candidate.trim()) {
            Ok(())
        } else {
            Err(TrackingError::OtpMismatch)
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> OtpState {
        if self.is_expired(now) {
            OtpState::Expired
        } else {
            OtpState::Sent
        }
    }
}

// Compare every byte so timing does not reveal the matching prefix length
fn codes_match(expected: &str, candidate: &str) -> bool {
    if candidate.len() != PICKUP_OTP_DIGITS || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if expected.len() != candidate.len() {
        return false;
    }

    expected
        .bytes()
        .zip(candidate.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn otp(code: &str) -> PickupOtp {
        PickupOtp {
            code: code.to_string(),
            expires_at: t0() + Duration::seconds(600),
        }
    }

    #[test]
    fn test_generate_six_digits_with_expiry() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let otp = PickupOtp::generate(&mut rng, t0(), Duration::seconds(600));
            assert_eq!(otp.code.len(), 6);
            assert!(otp.code.bytes().all(|b| b.is_ascii_digit()));
            assert_eq!(otp.expires_at, t0() + Duration::seconds(600));
        }
    }

    #[test]
    fn test_verify_before_expiry() {
        let otp = otp("482913");
        assert_eq!(otp.verify("482913", t0() + Duration::seconds(599)), Ok(()));
        assert_eq!(otp.verify(" 482913 ", t0()), Ok(()));
    }

    #[test]
    fn test_verify_after_expiry_fails_regardless_of_code() {
        let otp = otp("482913");
        let late = t0() + Duration::seconds(601);
        assert_eq!(otp.verify("482913", late), Err(TrackingError::OtpExpired));
        assert_eq!(otp.verify("000000", late), Err(TrackingError::OtpExpired));
        assert_eq!(
            otp.verify("482913", t0() + Duration::seconds(600)),
            Err(TrackingError::OtpExpired)
        );
    }

    #[test]
    fn test_verify_mismatch() {
        let otp = otp("482913");
        assert_eq!(otp.verify("482914", t0()), Err(TrackingError::OtpMismatch));
        assert_eq!(otp.verify("48291", t0()), Err(TrackingError::OtpMismatch));
        assert_eq!(otp.verify("48291a", t0()), Err(TrackingError::OtpMismatch));
        assert_eq!(otp.verify("", t0()), Err(TrackingError::OtpMismatch));
    }

    #[test]
    fn test_state() {
        let otp = otp("482913");
        assert_eq!(otp.state(t0()), OtpState::Sent);
        assert_eq!(otp.state(t0() + Duration::seconds(600)), OtpState::Expired);
    }
}
