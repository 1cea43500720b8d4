//! `/live` and `/ready` (§4.10/§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::SharedState;

pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "live" })))
}

pub async fn ready(State(state): State<SharedState>) -> impl IntoResponse {
    let report = state.ready.readiness().await;
    let status = if report.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}
