//! Individual tool implementations. Each submodule owns one (or, for the
//! `checkpoint.*`/`jobs.*` families, a closely related pair/triple of) tool
//! struct implementing [`crate::registry::Tool`].

pub mod checkpoint;
pub mod get;
pub mod jobs;
pub mod ping;
pub mod search;
pub mod similar;
pub mod sync;

use crate::registry::ToolRegistry;

/// Builds the registry with every tool in the catalog registered, the
/// generalized counterpart of the teacher's `build_default_registry`.
pub fn build_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ping::PingTool);
    registry.register(search::SearchTool);
    registry.register(similar::SimilarTool);
    registry.register(get::GetTool);
    registry.register(sync::SyncTool);
    registry.register(checkpoint::CheckpointGetTool);
    registry.register(checkpoint::CheckpointSetTool);
    registry.register(jobs::JobsGetTool);
    registry.register(jobs::JobsCancelTool);
    registry.register(jobs::JobsListTool);
    tracing::info!("tool registry ready with {} tools", registry.len());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &[&str] =
        &["ping", "search", "similar", "get", "sync", "checkpoint.get", "checkpoint.set", "jobs.get", "jobs.cancel", "jobs.list"];

    #[test]
    fn default_registry_has_the_full_catalog() {
        let registry = build_default_registry();
        for name in CATALOG {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
        assert_eq!(registry.len(), CATALOG.len());
    }

    #[test]
    fn sync_is_the_only_long_running_tool() {
        let registry = build_default_registry();
        let long_running: Vec<&str> = CATALOG.iter().copied().filter(|name| registry.get(name).unwrap().is_long_running()).collect();
        assert_eq!(long_running, vec!["sync"]);
    }
}
