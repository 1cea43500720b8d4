//! Non-blocking per-tool + global concurrency caps (spec §4.8).
//!
//! Grounded on the `tokio::sync::Semaphore` fan-out pattern in
//! `other_examples/.../zircote-rlm__src-agent-orchestrator.rs.rs`
//! (`Orchestrator::run_batch` bounds concurrent subagent calls with a
//! `Semaphore`); here the same primitive gates tool invocations instead of
//! LLM subcalls, and acquisition is non-blocking rather than awaited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use medretrieve_common::config::LimiterSettings;
use medretrieve_common::{MedretrieveError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Held for the lifetime of a single tool invocation; dropping it frees both
/// the per-tool and the global slot.
pub struct ConcurrencyPermit {
    _tool: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

pub struct ConcurrencyLimiter {
    global: Arc<Semaphore>,
    per_tool: Mutex<HashMap<String, Arc<Semaphore>>>,
    default_cap: u32,
}

impl ConcurrencyLimiter {
    pub fn new(settings: &LimiterSettings) -> Self {
        let mut per_tool = HashMap::new();
        per_tool.insert("search".to_string(), Arc::new(Semaphore::new(settings.per_tool_search as usize)));
        per_tool.insert("sync".to_string(), Arc::new(Semaphore::new(settings.per_tool_sync as usize)));
        per_tool.insert("get".to_string(), Arc::new(Semaphore::new(settings.per_tool_get as usize)));
        per_tool.insert("ingest".to_string(), Arc::new(Semaphore::new(settings.per_tool_ingest as usize)));

        Self { global: Arc::new(Semaphore::new(settings.global as usize)), per_tool: Mutex::new(per_tool), default_cap: settings.per_tool_get }
    }

    fn tool_semaphore(&self, tool: &str) -> Arc<Semaphore> {
        self.per_tool.lock().unwrap().entry(tool.to_string()).or_insert_with(|| Arc::new(Semaphore::new(self.default_cap as usize))).clone()
    }

    /// Attempts to acquire both a per-tool and a global slot without
    /// blocking. On exhaustion, returns `RATE_LIMIT` with a suggested
    /// `Retry-After` of at least one second (spec §4.8).
    pub fn try_acquire(&self, tool: &str) -> Result<ConcurrencyPermit> {
        let tool_sem = self.tool_semaphore(tool);

        let tool_permit = tool_sem.clone().try_acquire_owned().map_err(|_| {
            debug!(tool, "per-tool concurrency cap exhausted");
            MedretrieveError::RateLimit(format!("tool '{tool}' is at its concurrency cap; retry after 1s"))
        })?;

        let global_permit = match self.global.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                drop(tool_permit);
                debug!("global concurrency cap exhausted");
                return Err(MedretrieveError::RateLimit("global concurrency cap exhausted; retry after 1s".to_string()));
            }
        };

        Ok(ConcurrencyPermit { _tool: tool_permit, _global: global_permit })
    }

    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }

    pub fn tool_available(&self, tool: &str) -> Option<usize> {
        self.per_tool.lock().unwrap().get(tool).map(|s| s.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LimiterSettings {
        LimiterSettings { global: 2, per_tool_search: 1, per_tool_sync: 1, per_tool_get: 1, per_tool_ingest: 1 }
    }

    #[test]
    fn acquires_a_slot_when_available() {
        let limiter = ConcurrencyLimiter::new(&settings());
        let permit = limiter.try_acquire("search");
        assert!(permit.is_ok());
    }

    #[test]
    fn rejects_when_per_tool_cap_is_exhausted() {
        let limiter = ConcurrencyLimiter::new(&settings());
        let _first = limiter.try_acquire("search").unwrap();
        let second = limiter.try_acquire("search");
        assert!(matches!(second, Err(MedretrieveError::RateLimit(_))));
    }

    #[test]
    fn releases_the_slot_on_drop() {
        let limiter = ConcurrencyLimiter::new(&settings());
        {
            let _permit = limiter.try_acquire("search").unwrap();
            assert_eq!(limiter.tool_available("search"), Some(0));
        }
        assert_eq!(limiter.tool_available("search"), Some(1));
    }

    #[test]
    fn unknown_tool_gets_the_default_cap() {
        let limiter = ConcurrencyLimiter::new(&settings());
        let permit = limiter.try_acquire("ping");
        assert!(permit.is_ok());
    }

    #[test]
    fn global_cap_binds_across_tools() {
        let limiter = ConcurrencyLimiter::new(&LimiterSettings { global: 1, per_tool_search: 5, per_tool_sync: 5, per_tool_get: 5, per_tool_ingest: 5 });
        let _first = limiter.try_acquire("search").unwrap();
        let second = limiter.try_acquire("get");
        assert!(matches!(second, Err(MedretrieveError::RateLimit(_))));
    }
}
