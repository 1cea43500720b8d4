use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medretrieve_common::{MedretrieveError, Result};
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct CheckpointGetTool;

#[async_trait]
impl Tool for CheckpointGetTool {
    fn name(&self) -> &str {
        "checkpoint.get"
    }

    fn description(&self) -> &str {
        "Reads the saved sync watermark (cursor) for a source."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "source": { "type": "string" } },
            "required": ["source"],
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
        let source = params.get("source").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("source", "source is required"))?;

        let cursor = ctx.watermarks.get(source).await?.map(|w| w.cursor);
        Ok(serde_json::json!({ "source": source, "cursor": cursor }))
    }
}

pub struct CheckpointSetTool;

#[async_trait]
impl Tool for CheckpointSetTool {
    fn name(&self) -> &str {
        "checkpoint.set"
    }

    fn description(&self) -> &str {
        "Administrative override of a source's saved watermark; always audited."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": { "type": "string" },
                "cursor": { "type": "string", "format": "date-time" },
                "reason": { "type": "string" },
            },
            "required": ["source", "cursor"],
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
        let source = params.get("source").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("source", "source is required"))?;
        let cursor_str = params.get("cursor").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("cursor", "cursor is required"))?;
        let cursor: DateTime<Utc> = DateTime::parse_from_rfc3339(cursor_str)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| MedretrieveError::validation("cursor", format!("invalid RFC3339 timestamp: {e}")))?;
        let reason = params.get("reason").and_then(Value::as_str).unwrap_or("manual override via tool invocation");

        let watermark = ctx.watermarks.set(source, cursor, "tool-invoker", reason).await?;
        Ok(serde_json::json!({ "source": watermark.source, "cursor": watermark.cursor }))
    }
}
