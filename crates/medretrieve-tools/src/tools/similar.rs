use std::time::Duration;

use async_trait::async_trait;
use medretrieve_common::{MedretrieveError, Result};
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

pub struct SimilarTool;

#[async_trait]
impl Tool for SimilarTool {
    fn name(&self) -> &str {
        "similar"
    }

    fn description(&self) -> &str {
        "Finds documents similar to a given document, restricted to its source."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIMIT },
            },
            "required": ["uid"],
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn cap_key(&self) -> &str {
        "search"
    }

    async fn run(&self, ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        let uid = params.get("uid").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("uid", "uid is required"))?;
        let limit = params.get("limit").and_then(Value::as_u64).map(|l| l as usize).unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let hits = ctx.engine.similar_to(uid, limit).await?;
        Ok(serde_json::json!({ "hits": hits }))
    }
}
