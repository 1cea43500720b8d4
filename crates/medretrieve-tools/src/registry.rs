//! The tool surface's core trait and registry (C7), generalizing the
//! teacher's `ferrumyx-agent/src/tools/mod.rs::FerrumyxTool`/`ToolRegistry`
//! from an LLM-planner function manifest onto the spec's fixed tool catalog:
//! each tool still declares a name, description and JSON-Schema params, but
//! adds a per-tool timeout, concurrency cap key and long-running flag that
//! the invoker (`crate::invoker`) uses to drive §4.7/§4.8.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use medretrieve_common::Result;
use serde_json::Value;

use crate::context::ToolContext;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, used as the invoke surface's `tool` field (e.g.
    /// `"search"`, `"checkpoint.get"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing the expected `params` object.
    fn params_schema(&self) -> Value;

    fn timeout(&self) -> Duration;

    /// Key into the concurrency limiter's per-tool semaphore map.
    fn cap_key(&self) -> &str;

    /// Long-running tools are rejected for synchronous invocation; callers
    /// must go through the job API instead (spec §4.7).
    fn is_long_running(&self) -> bool {
        false
    }

    /// `idempotency_key` comes from the invoke envelope itself (spec §6), not
    /// from `params`; only tools that enqueue a job (`sync`) consume it.
    async fn run(&self, ctx: &ToolContext, params: Value, idempotency_key: Option<&str>) -> Result<Value>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        assert!(!self.tools.contains_key(&name), "duplicate tool name: {name}");
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The tool manifest: name, description, schema and flags per tool,
    /// suitable for an `/invoke` discovery endpoint.
    pub fn manifest(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "params_schema": t.params_schema(),
                    "is_long_running": t.is_long_running(),
                })
            })
            .collect();
        serde_json::json!({ "tools": tools })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes params back"
        }
        fn params_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn cap_key(&self) -> &str {
            "get"
        }
        async fn run(&self, _ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
            Ok(params)
        }
    }

    #[test]
    fn registers_and_looks_up_a_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate tool name")]
    fn panics_on_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(EchoTool);
    }

    #[test]
    fn manifest_lists_every_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let manifest = registry.manifest();
        let tools = manifest["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
    }
}
