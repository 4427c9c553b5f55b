use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ride_tracking_backend::{
    config::Config,
    db::{self, SeaOrmBookingStore},
    middleware::rate_limit::{create_global_governor, create_otp_resend_limiter, log_request},
    routes,
    tracking::{LogOtpDelivery, OsrmRoutingProvider, OtpDelivery},
    utils::sms::WebhookSmsDelivery,
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ride_tracking_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client");

    let delivery: Arc<dyn OtpDelivery> = match &config.sms_webhook_url {
        Some(url) => {
            tracing::info!("Pickup codes delivered through SMS webhook");
            Arc::new(WebhookSmsDelivery::new(http.clone(), url.clone()))
        }
        None => {
            tracing::warn!("SMS_WEBHOOK_URL not set, pickup codes go to the log");
            Arc::new(LogOtpDelivery)
        }
    };

    // Create app state
    let state = AppState {
        db: db.clone(),
        config: config.clone(),
        store: Arc::new(SeaOrmBookingStore::new(
            db,
            delivery,
            chrono::Duration::seconds(config.pickup_otp_ttl_seconds),
        )),
        routing: Arc::new(OsrmRoutingProvider::new(http, config.routing_base_url.clone())),
        otp_limiter: create_otp_resend_limiter(
            Duration::from_secs(config.otp_resend_cooldown_seconds),
            config.otp_resend_burst,
        ),
    };

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(create_global_governor())
        .layer(middleware::from_fn(log_request));

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
