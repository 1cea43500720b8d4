//! The `/invoke` entry point (C7): validates the call, acquires concurrency
//! slots, dispatches with a per-tool timeout, and always returns the same
//! envelope shape whether the tool succeeded or failed.

use std::sync::Arc;

use medretrieve_common::{MedretrieveError, Result};
use medretrieve_limiter::ConcurrencyLimiter;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ToolContext;
use crate::registry::ToolRegistry;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InvokeEnvelope {
    Ok { ok: bool, tool: String, result: Value, trace_id: String },
    Err { ok: bool, tool: String, error_code: String, message: String, trace_id: String },
}

impl InvokeEnvelope {
    fn ok(tool: &str, result: Value, trace_id: String) -> Self {
        InvokeEnvelope::Ok { ok: true, tool: tool.to_string(), result, trace_id }
    }

    fn err(tool: &str, error: &MedretrieveError, trace_id: String) -> Self {
        InvokeEnvelope::Err {
            ok: false,
            tool: tool.to_string(),
            error_code: error.code().as_str().to_string(),
            message: error.user_message(),
            trace_id,
        }
    }
}

pub struct Invoker {
    registry: ToolRegistry,
    limiter: Arc<ConcurrencyLimiter>,
    context: ToolContext,
}

impl Invoker {
    pub fn new(registry: ToolRegistry, limiter: Arc<ConcurrencyLimiter>, context: ToolContext) -> Self {
        Self { registry, limiter, context }
    }

    pub fn manifest(&self) -> Value {
        self.registry.manifest()
    }

    /// Runs the six-step invoke flow from start to finish. Never panics and
    /// never propagates an `Err` — every outcome, including an unknown tool
    /// name or a timeout, is folded into the returned envelope.
    pub async fn invoke(&self, tool_name: &str, params: Value, idempotency_key: Option<&str>) -> InvokeEnvelope {
        // Wire format is plain hex (spec §6: `"trace_id": "<hex>"`), not the
        // dashed UUID rendering.
        let trace_id = Uuid::new_v4().simple().to_string();

        // 1. Validate the tool exists.
        let Some(tool) = self.registry.get(tool_name) else {
            let err = MedretrieveError::NotFound(format!("tool {tool_name:?}"));
            warn!(tool = tool_name, trace_id = %trace_id, "unknown tool");
            return InvokeEnvelope::err(tool_name, &err, trace_id);
        };

        // Long-running tools (e.g. `sync`) still dispatch here; they enqueue
        // a job and return immediately rather than blocking, so no special
        // casing is needed before step 2.

        // 2. Validate params against the tool's declared schema.
        if let Err(e) = validate_params(&tool.params_schema(), &params) {
            warn!(tool = tool_name, trace_id = %trace_id, error = %e, "params failed schema validation");
            return InvokeEnvelope::err(tool_name, &e, trace_id);
        }

        // 3. Acquire per-tool and global concurrency slots.
        let _permit = match self.limiter.try_acquire(tool.cap_key()) {
            Ok(permit) => permit,
            Err(e) => {
                warn!(tool = tool_name, trace_id = %trace_id, "concurrency limit exhausted");
                return InvokeEnvelope::err(tool_name, &e, trace_id);
            }
        };

        // 4. trace_id was generated above, ahead of dispatch so it appears in
        // every log line for this call.
        info!(tool = tool_name, trace_id = %trace_id, "dispatching tool");

        // 5. Dispatch with the tool's timeout enforced.
        let outcome = tokio::time::timeout(tool.timeout(), tool.run(&self.context, params, idempotency_key)).await;

        // 6. Uniform envelope.
        match outcome {
            Ok(Ok(result)) => InvokeEnvelope::ok(tool_name, result, trace_id),
            Ok(Err(e)) => {
                warn!(tool = tool_name, trace_id = %trace_id, error = %e, "tool returned an error");
                InvokeEnvelope::err(tool_name, &e, trace_id)
            }
            Err(_) => {
                let e = MedretrieveError::Timeout(format!("tool {tool_name} exceeded {:?}", tool.timeout()));
                warn!(tool = tool_name, trace_id = %trace_id, "tool timed out");
                InvokeEnvelope::err(tool_name, &e, trace_id)
            }
        }
    }
}

fn validate_params(schema: &Value, params: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| MedretrieveError::Invariant(format!("tool declared an invalid params schema: {e}")))?;

    let errors: Vec<String> = validator.iter_errors(params).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MedretrieveError::validation("params", errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medretrieve_common::config::LimiterSettings;

    #[test]
    fn validate_params_rejects_missing_required_field() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "uid": { "type": "string" } },
            "required": ["uid"],
        });
        let err = validate_params(&schema, &serde_json::json!({})).unwrap_err();
        assert_eq!(err.code(), medretrieve_common::ErrorCode::Validation);
    }

    #[test]
    fn validate_params_accepts_well_formed_params() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "uid": { "type": "string" } },
            "required": ["uid"],
        });
        assert!(validate_params(&schema, &serde_json::json!({"uid": "pubmed:1"})).is_ok());
    }

    #[test]
    fn limiter_settings_are_constructible_for_tests() {
        let _limiter = ConcurrencyLimiter::new(&LimiterSettings::default());
    }
}
