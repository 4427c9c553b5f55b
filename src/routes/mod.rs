use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{admin, driver, traveller};
use crate::middleware::auth::{auth_middleware, require_admin, require_driver, require_traveller};
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Create role-specific governor layers
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let traveller_governor = create_role_governor(RateLimitedRole::Traveller);

    // Admin routes (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/bookings", get(admin::list_all_bookings))
        .route("/bookings/{id}/assign-driver", post(admin::assign_driver))
        .route("/bookings/{id}/status", post(admin::update_status))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Driver routes (requires auth + driver role)
    // There is deliberately no status route here: trips start through
    // pickup-otp/verify only.
    let driver_routes = Router::new()
        .route("/bookings", get(driver::my_bookings))
        .route("/bookings/{id}", get(driver::get_booking))
        .route("/bookings/{id}/location", put(driver::update_location))
        .route("/bookings/{id}/pickup-otp", post(driver::request_pickup_otp))
        .route("/bookings/{id}/pickup-otp/verify", post(driver::verify_pickup_otp))
        .route("/bookings/{id}/complete", post(driver::complete_trip))
        .route("/bookings/{id}/cancel", post(driver::cancel_booking))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Traveller routes (requires auth + traveller role)
    let traveller_routes = Router::new()
        .route("/{id}", get(traveller::get_booking))
        .route("/{id}/route-preview", get(traveller::get_route_preview))
        .route("/{id}/cancel", post(traveller::cancel_booking))
        .layer(traveller_governor)
        .layer(middleware::from_fn(require_traveller))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/bookings", traveller_routes)
        .with_state(state)
}
