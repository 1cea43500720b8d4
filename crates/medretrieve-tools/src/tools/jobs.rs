use std::time::Duration;

use async_trait::async_trait;
use medretrieve_common::{MedretrieveError, Result};
use medretrieve_db::JobStatus;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::context::ToolContext;
use crate::registry::Tool;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Serialize)]
struct JobView {
    id: Uuid,
    job_type: String,
    status: String,
    attempts: i32,
    max_retries: i32,
    progress_percent: i32,
    progress_message: Option<String>,
    last_error: Option<String>,
    result: Option<Value>,
}

impl From<&medretrieve_db::Job> for JobView {
    fn from(job: &medretrieve_db::Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            status: job.status.as_str().to_string(),
            attempts: job.attempts,
            max_retries: job.max_retries,
            progress_percent: job.progress_percent,
            progress_message: job.progress_message.clone(),
            last_error: job.last_error.clone(),
            result: job.result.clone(),
        }
    }
}

fn parse_job_id(params: &Value) -> Result<Uuid> {
    let raw = params.get("job_id").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("job_id", "job_id is required"))?;
    Uuid::parse_str(raw).map_err(|e| MedretrieveError::validation("job_id", format!("not a valid uuid: {e}")))
}

fn parse_status_filter(params: &Value) -> Result<Option<JobStatus>> {
    match params.get("status").and_then(Value::as_str) {
        None => Ok(None),
        Some("queued") => Ok(Some(JobStatus::Queued)),
        Some("running") => Ok(Some(JobStatus::Running)),
        Some("succeeded") => Ok(Some(JobStatus::Succeeded)),
        Some("failed") => Ok(Some(JobStatus::Failed)),
        Some("cancelled") => Ok(Some(JobStatus::Cancelled)),
        Some(other) => Err(MedretrieveError::validation("status", format!("unknown job status {other:?}"))),
    }
}

pub struct JobsGetTool;

#[async_trait]
impl Tool for JobsGetTool {
    fn name(&self) -> &str {
        "jobs.get"
    }

    fn description(&self) -> &str {
        "Fetches a job's current status, progress, and result (if finished)."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "job_id": { "type": "string" } },
            "required": ["job_id"],
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cap_key(&self) -> &str {
        "get"
    }

    async fn run(&self, ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        let id = parse_job_id(&params)?;
        let job = ctx.jobs.get(id).await?.ok_or_else(|| MedretrieveError::NotFound(format!("job {id}")))?;
        Ok(serde_json::to_value(JobView::from(&job))?)
    }
}

pub struct JobsCancelTool;

#[async_trait]
impl Tool for JobsCancelTool {
    fn name(&self) -> &str {
        "jobs.cancel"
    }

    fn description(&self) -> &str {
        "Cancels a queued or running job; fails if the job already reached a terminal state."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "job_id": { "type": "string" } },
            "required": ["job_id"],
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cap_key(&self) -> &str {
        "get"
    }

    async fn run(&self, ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        let id = parse_job_id(&params)?;
        let job = ctx.jobs.cancel(id).await?;
        Ok(serde_json::to_value(JobView::from(&job))?)
    }
}

pub struct JobsListTool;

#[async_trait]
impl Tool for JobsListTool {
    fn name(&self) -> &str {
        "jobs.list"
    }

    fn description(&self) -> &str {
        "Lists jobs, most recent first, optionally filtered by status."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIST_LIMIT },
                "offset": { "type": "integer", "minimum": 0 },
            },
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cap_key(&self) -> &str {
        "get"
    }

    async fn run(&self, ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        let status = parse_status_filter(&params)?;
        let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = params.get("offset").and_then(Value::as_i64).unwrap_or(0).max(0);

        let jobs = ctx.jobs.list(status, limit, offset).await?;
        let views: Vec<JobView> = jobs.iter().map(JobView::from).collect();
        Ok(serde_json::json!({ "jobs": views }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_job_id() {
        let err = parse_job_id(&serde_json::json!({"job_id": "not-a-uuid"})).unwrap_err();
        assert_eq!(err.code(), medretrieve_common::ErrorCode::Validation);
    }

    #[test]
    fn status_filter_defaults_to_none() {
        assert!(parse_status_filter(&serde_json::json!({})).unwrap().is_none());
    }

    #[test]
    fn status_filter_rejects_unknown_value() {
        assert!(parse_status_filter(&serde_json::json!({"status": "zombie"})).is_err());
    }
}
