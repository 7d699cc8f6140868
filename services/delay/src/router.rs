use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use delay_core::health::{Readiness, healthz, readyz};

/// Health endpoints only; all delay traffic flows through the streams.
pub fn build_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(readiness)
}
