//! The job API (§4.9/§6), a thin HTTP veneer over the `jobs.*` and `sync`
//! tools — it shares the same invoke/concurrency/timeout machinery rather
//! than talking to `JobRepository` directly.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use medretrieve_tools::InvokeEnvelope;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::handlers::invoke::status_for_envelope;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    pub idempotency_key: Option<String>,
}

/// `POST /v1/jobs` — enqueues a long-running tool. `tool` must name one with
/// `is_long_running=true` (currently just `sync`); anything else still runs,
/// but synchronously, through the same invoke path.
pub async fn create_job(State(state): State<SharedState>, Json(req): Json<CreateJobRequest>) -> impl IntoResponse {
    let envelope = state.invoker.invoke(&req.tool, req.params, req.idempotency_key.as_deref()).await;
    respond_with_result(envelope)
}

/// `GET /v1/jobs/{id}` — full row minus sensitive fields, via the `jobs.get`
/// tool's `JobView` projection.
pub async fn get_job(State(state): State<SharedState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let envelope = state.invoker.invoke("jobs.get", serde_json::json!({ "job_id": id }), None).await;
    respond_with_result(envelope)
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /v1/jobs` — supplemented pagination/filter listing (§4.9's
/// "observability contract" requires this; not in the minimal tool catalog
/// but implied by it).
pub async fn list_jobs(State(state): State<SharedState>, Query(query): Query<ListJobsQuery>) -> impl IntoResponse {
    let params = serde_json::json!({ "status": query.status, "limit": query.limit, "offset": query.offset });
    let envelope = state.invoker.invoke("jobs.list", params, None).await;
    respond_with_result(envelope)
}

/// `POST /v1/jobs/{id}/cancel` — supplemented: §4.9 describes a cancellation
/// request but the minimal catalog only names the `jobs.cancel` tool, not an
/// HTTP route for it.
pub async fn cancel_job(State(state): State<SharedState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let envelope = state.invoker.invoke("jobs.cancel", serde_json::json!({ "job_id": id }), None).await;
    respond_with_result(envelope)
}

fn respond_with_result(envelope: InvokeEnvelope) -> impl IntoResponse {
    let status = status_for_envelope(&envelope);
    let body = match &envelope {
        InvokeEnvelope::Ok { result, .. } => result.clone(),
        InvokeEnvelope::Err { error_code, message, .. } => {
            serde_json::json!({ "error_code": error_code, "message": message })
        }
    };
    (status, Json(body))
}
