use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{patient, payment, rider};
use crate::middleware::auth::{auth_middleware, require_patient, require_rider};
use crate::middleware::rate_limit::{create_public_governor, log_request};
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Create role-specific governor layers
    let patient_governor = create_role_governor(RateLimitedRole::Patient);
    let rider_governor = create_role_governor(RateLimitedRole::Rider);
    // Create IP-based governor for public routes
    let public_governor = create_public_governor();

    // Public routes (route preview needs no session)
    let public_routes = Router::new()
        .route("/routes/preview", get(patient::route_preview))
        .layer(public_governor);

    // Patient routes (requires auth + patient role)
    let patient_routes = Router::new()
        .route("/requests/{request_id}/tracking", get(patient::get_tracking))
        .route("/requests/{request_id}/map", get(patient::get_map))
        .route("/deliveries/{delivery_id}/rider-fix", get(patient::rider_fix))
        .route("/deliveries/{delivery_id}/payment", post(payment::submit_payment))
        .route("/payment/upi-link", post(payment::upi_link))
        .route("/payment/prefs", get(payment::get_prefs))
        .route("/payment/prefs", put(payment::put_prefs))
        .layer(patient_governor)
        .layer(middleware::from_fn(require_patient))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Rider routes (requires auth + rider role)
    let rider_routes = Router::new()
        .route("/deliveries/{delivery_id}/ping", post(rider::post_ping))
        .layer(rider_governor)
        .layer(middleware::from_fn(require_rider))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/api", public_routes)
        .nest("/api/patient", patient_routes)
        .nest("/api/rider", rider_routes)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
