//! `POST /invoke` — the HTTP transport for the tool invoke surface (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use medretrieve_common::ErrorCode;
use medretrieve_tools::InvokeEnvelope;
use serde::Deserialize;
use serde_json::Value;

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    pub idempotency_key: Option<String>,
}

/// Maps a wire `error_code` string back to the enum so the HTTP layer can
/// pick a status code; the invoker only ever emits the values in
/// `ErrorCode::as_str`.
pub(crate) fn error_code_from_wire(code: &str) -> ErrorCode {
    match code {
        "VALIDATION" => ErrorCode::Validation,
        "NOT_FOUND" => ErrorCode::NotFound,
        "RATE_LIMIT" => ErrorCode::RateLimit,
        "UPSTREAM" => ErrorCode::Upstream,
        "TIMEOUT" => ErrorCode::Timeout,
        "BREAKER_OPEN" => ErrorCode::BreakerOpen,
        "UNAVAILABLE" => ErrorCode::Unavailable,
        "CONFLICT" => ErrorCode::Conflict,
        "INVARIANT" => ErrorCode::Invariant,
        _ => ErrorCode::Unknown,
    }
}

/// §6's literal status list: 200 success, 202 accepted, 400 validation, 404
/// unknown tool/job, 409 idempotency conflict, 429 back-pressure, 503 not
/// ready, 500 unclassified.
pub(crate) fn status_for_error(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Upstream | ErrorCode::Timeout | ErrorCode::BreakerOpen | ErrorCode::Invariant | ErrorCode::Unknown => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn status_for_envelope(envelope: &InvokeEnvelope) -> StatusCode {
    match envelope {
        InvokeEnvelope::Ok { result, .. } => {
            if result.get("job_id").is_some() {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            }
        }
        InvokeEnvelope::Err { error_code, .. } => status_for_error(error_code_from_wire(error_code)),
    }
}

pub async fn invoke(State(state): State<SharedState>, Json(req): Json<InvokeRequest>) -> impl IntoResponse {
    let envelope = state.invoker.invoke(&req.tool, req.params, req.idempotency_key.as_deref()).await;
    let status = status_for_envelope(&envelope);
    (status, Json(envelope))
}
