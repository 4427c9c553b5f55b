use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub routing_base_url: String,
    pub sms_webhook_url: Option<String>,
    pub pickup_otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: u64,
    pub otp_resend_burst: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            routing_base_url: env::var("ROUTING_BASE_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
            sms_webhook_url: env::var("SMS_WEBHOOK_URL").ok().filter(|url| !url.is_empty()),
            pickup_otp_ttl_seconds: env::var("PICKUP_OTP_TTL_SECONDS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .expect("PICKUP_OTP_TTL_SECONDS must be a number"),
            otp_resend_cooldown_seconds: env::var("OTP_RESEND_COOLDOWN_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("OTP_RESEND_COOLDOWN_SECONDS must be a number"),
            otp_resend_burst: env::var("OTP_RESEND_BURST")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("OTP_RESEND_BURST must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
