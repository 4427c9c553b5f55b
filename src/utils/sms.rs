use async_trait::async_trait;
use serde::Serialize;

use crate::tracking::{OtpDelivery, TrackingError, TrackingResult};

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    phone: &'a str,
    message: String,
}

pub fn pickup_message(code: &str) -> String {
    format!(
        "Your pickup code is {}. Share it with your driver when you board.",
        code
    )
}

/// Delivers pickup codes through an HTTP SMS gateway that accepts
/// `{ "phone", "message" }`.
#[derive(Clone)]
pub struct WebhookSmsDelivery {
    client: reqwest::Client,
    url: String,
}

impl WebhookSmsDelivery {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl OtpDelivery for WebhookSmsDelivery {
    async fn send(&self, phone_number: &str, code: &str) -> TrackingResult<()> {
        let payload = SmsPayload {
            phone: phone_number,
            message: pickup_message(code),
        };

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TrackingError::Provider(format!("SMS gateway unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| TrackingError::Provider(format!("SMS gateway rejected message: {}", e)))?;

        tracing::debug!(phone = phone_number, "Pickup code handed to SMS gateway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = SmsPayload {
            phone: "+919800000000",
            message: pickup_message("048213"),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["phone"], "+919800000000");
        assert!(json["message"].as_str().unwrap().contains("048213"));
    }
}
