use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use medretrieve_common::{MedretrieveError, Result};
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

const DEFAULT_SYNC_LIMIT: u64 = 100;
const MAX_OVERLAP_DAYS: i64 = 30;

/// Enqueues a sync job rather than running ingestion inline; §4.7 routes
/// long-running tools through the job API so `/invoke` never blocks on a
/// network fetch.
pub struct SyncTool;

#[async_trait]
impl Tool for SyncTool {
    fn name(&self) -> &str {
        "sync"
    }

    fn description(&self) -> &str {
        "Enqueues a background ingestion sync for a source, starting from its saved checkpoint."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1 },
                "overlap_days": { "type": "integer", "minimum": 0, "maximum": 30 },
            },
            "required": ["source"],
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn cap_key(&self) -> &str {
        "sync"
    }

    fn is_long_running(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ToolContext, params: Value, idempotency_key: Option<&str>) -> Result<Value> {
        let source = params
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| MedretrieveError::validation("source", "source is required"))?;
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(DEFAULT_SYNC_LIMIT);
        let overlap_days = params.get("overlap_days").and_then(Value::as_i64).map(|d| d.clamp(0, MAX_OVERLAP_DAYS));

        let mut payload = serde_json::json!({ "source": source, "limit": limit });
        if let Some(overlap_days) = overlap_days {
            payload["overlap_days"] = serde_json::json!(overlap_days);
        }
        let window = ChronoDuration::hours(ctx.job_settings.idempotency_window_hours);

        let (job, created) = ctx
            .jobs
            .create("sync", payload, idempotency_key, ctx.job_settings.max_retries as i32, window)
            .await?;

        Ok(serde_json::json!({
            "job_id": job.id,
            "status": job.status.as_str(),
            "deduplicated": !created,
        }))
    }
}
