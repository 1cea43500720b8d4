use std::time::Duration;

use async_trait::async_trait;
use medretrieve_common::{MedretrieveError, Result};
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct GetTool;

#[async_trait]
impl Tool for GetTool {
    fn name(&self) -> &str {
        "get"
    }

    fn description(&self) -> &str {
        "Fetches a single document by uid, reconstructed with its ordered chunks."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string" },
                "include_chunks": { "type": "boolean" },
            },
            "required": ["uid"],
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
        let uid = params.get("uid").and_then(Value::as_str).ok_or_else(|| MedretrieveError::validation("uid", "uid is required"))?;
        let include_chunks = params.get("include_chunks").and_then(Value::as_bool).unwrap_or(false);

        match ctx.engine.get_by_uid(uid, include_chunks).await? {
            Some(reconstructed) => Ok(serde_json::to_value(reconstructed)?),
            None => Err(MedretrieveError::NotFound(format!("document {uid}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_include_chunks_is_false() {
        let params = serde_json::json!({"uid": "pubmed:1"});
        let include_chunks = params.get("include_chunks").and_then(Value::as_bool).unwrap_or(false);
        assert!(!include_chunks);
    }
}
