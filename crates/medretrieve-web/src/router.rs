//! Axum router — maps URL paths to handlers.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers::{health, invoke, jobs, metrics};
use crate::sse;
use crate::state::{AppState, SharedState};

/// Builds the full Axum router. `shared_secret` gates every route except
/// `/live`/`/ready`, which orchestrators must be able to reach unauthenticated.
pub fn build_router(state: AppState, shared_secret: Option<String>) -> Router {
    let shared: SharedState = Arc::new(state);
    let secret = Arc::new(shared_secret);

    let protected = Router::new()
        .route("/invoke", post(invoke::invoke))
        .route("/v1/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/v1/jobs/{id}", get(jobs::get_job))
        .route("/v1/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/v1/jobs/{id}/events", get(sse::job_events))
        .route("/metrics", get(metrics::metrics))
        .layer(middleware::from_fn_with_state(secret, auth::require_shared_secret));

    let public = Router::new().route("/live", get(health::live)).route("/ready", get(health::ready));

    protected
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
