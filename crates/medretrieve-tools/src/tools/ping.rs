use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use medretrieve_common::Result;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct PingTool;

fn ping_response(message: Option<&str>) -> Value {
    serde_json::json!({
        "pong": message.unwrap_or("pong"),
        "server_time": Utc::now().to_rfc3339(),
    })
}

#[async_trait]
impl Tool for PingTool {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Liveness check for the tool surface itself; echoes an optional message back."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn cap_key(&self) -> &str {
        "get"
    }

    async fn run(&self, _ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        Ok(ping_response(params.get("message").and_then(Value::as_str)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_pong_when_message_absent() {
        let response = ping_response(None);
        assert_eq!(response["pong"], "pong");
        assert!(response["server_time"].is_string());
    }

    #[test]
    fn echoes_provided_message() {
        let response = ping_response(Some("hello"));
        assert_eq!(response["pong"], "hello");
    }
}
