pub mod client;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod tracking;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use crate::db::SeaOrmBookingStore;
use crate::middleware::rate_limit::OtpResendLimiter;
use crate::tracking::RoutingProvider;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub store: Arc<SeaOrmBookingStore>,
    pub routing: Arc<dyn RoutingProvider>,
    pub otp_limiter: Arc<OtpResendLimiter>,
}
