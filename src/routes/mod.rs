use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{admin, auth, driver, passenger};
use crate::middleware::auth::{auth_middleware, require_admin, require_driver, require_passenger};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Create role-specific governor layers
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let passenger_governor = create_role_governor(RateLimitedRole::Passenger);
    // Create IP-based governor for public routes
    let public_governor = create_public_governor();

    // Public routes (rate limited per IP)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Fare quoting needs no account
    let quote_routes = Router::new()
        .route("/quote", post(passenger::quote))
        .layer(public_governor);

    // Passenger ride management (requires auth + passenger role)
    let passenger_routes = Router::new()
        .route("/", post(passenger::create_ride).get(passenger::my_rides))
        .route("/{id}/match", post(passenger::match_ride))
        .route("/{id}/cancel", post(passenger::cancel_ride))
        .layer(passenger_governor)
        .layer(middleware::from_fn(require_passenger))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Ride views shared by passenger, assigned driver and admin;
    // ownership is checked in the handlers
    let ride_shared_routes = Router::new()
        .route("/{id}", get(passenger::get_ride))
        .route("/{id}/events", get(passenger::ride_events))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Driver routes (requires auth + driver role)
    let driver_routes = Router::new()
        .route("/location", put(driver::update_location))
        .route("/requests", get(driver::open_requests))
        .route("/requests/events", get(driver::request_events))
        .route("/rides", get(driver::my_rides))
        .route("/rides/{id}/accept", post(driver::accept_ride))
        .route("/rides/{id}/status", post(driver::update_status))
        .route("/rides/{id}/cancel", post(driver::cancel_ride))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/rides", get(admin::list_rides))
        .route("/users", get(admin::list_all_users))
        .route("/fleet", get(admin::fleet))
        .route("/fleet/events", get(admin::fleet_events))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/api/auth", auth_routes)
        .nest(
            "/api/rides",
            passenger_routes.merge(ride_shared_routes).merge(quote_routes),
        )
        .nest("/api/driver", driver_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}
