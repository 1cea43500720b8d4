//! Composite readiness probing (C10). See ARCHITECTURE §4.10.
//!
//! Each dependency probe runs with its own timeout; the composite result is
//! cached briefly so a burst of `/ready` checks doesn't hammer the database
//! and vector store on every request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use medretrieve_common::config::ReadySettings;
use medretrieve_db::VectorStore;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub healthy: bool,
    pub probes: Vec<ProbeResult>,
}

struct Cached {
    report: ReadinessReport,
    checked_at: Instant,
}

pub struct ReadinessOrchestrator {
    pool: PgPool,
    vectors: Arc<VectorStore>,
    settings: ReadySettings,
    cache: Mutex<Option<Cached>>,
}

impl ReadinessOrchestrator {
    pub fn new(pool: PgPool, vectors: Arc<VectorStore>, settings: ReadySettings) -> Self {
        Self { pool, vectors, settings, cache: Mutex::new(None) }
    }

    /// Liveness never probes or consults the cache: it's healthy as long as
    /// the process can answer at all.
    pub fn liveness(&self) -> ProbeResult {
        ProbeResult { name: "process".to_string(), healthy: true, detail: None }
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.checked_at.elapsed() < Duration::from_millis(self.settings.cache_ttl_ms) {
                return cached.report.clone();
            }
        }

        let report = self.probe_all().await;
        *cache = Some(Cached { report: report.clone(), checked_at: Instant::now() });
        report
    }

    async fn probe_all(&self) -> ReadinessReport {
        let timeout = Duration::from_millis(self.settings.probe_timeout_ms);
        let (db, vector) = tokio::join!(self.probe_database(timeout), self.probe_vector_store(timeout));
        let probes = vec![db, vector];
        let healthy = probes.iter().all(|p| p.healthy);
        ReadinessReport { healthy, probes }
    }

    async fn probe_database(&self, timeout: Duration) -> ProbeResult {
        let check = medretrieve_db::pool::migration_status(&self.pool);
        match tokio::time::timeout(timeout, check).await {
            Ok(Ok((applied, expected))) if applied >= expected => {
                ProbeResult { name: "database".to_string(), healthy: true, detail: None }
            }
            Ok(Ok((applied, expected))) => ProbeResult {
                name: "database".to_string(),
                healthy: false,
                detail: Some(format!("{applied}/{expected} migrations applied")),
            },
            Ok(Err(e)) => ProbeResult { name: "database".to_string(), healthy: false, detail: Some(e.to_string()) },
            Err(_) => {
                ProbeResult { name: "database".to_string(), healthy: false, detail: Some("probe timed out".to_string()) }
            }
        }
    }

    /// `VectorStore::count` opens the chunks table, which exercises both
    /// "reachable" and "collection exists with the expected schema" (the
    /// table's `embedding` column is fixed at `EMBEDDING_DIM` by
    /// `chunks_schema`, so a schema mismatch would fail here too).
    async fn probe_vector_store(&self, timeout: Duration) -> ProbeResult {
        match tokio::time::timeout(timeout, self.vectors.count()).await {
            Ok(Ok(_)) => ProbeResult { name: "vector_store".to_string(), healthy: true, detail: None },
            Ok(Err(e)) => ProbeResult { name: "vector_store".to_string(), healthy: false, detail: Some(e.to_string()) },
            Err(_) => {
                ProbeResult { name: "vector_store".to_string(), healthy: false, detail: Some("probe timed out".to_string()) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_unhealthy_if_any_probe_failed() {
        let report = ReadinessReport {
            healthy: false,
            probes: vec![
                ProbeResult { name: "database".to_string(), healthy: true, detail: None },
                ProbeResult { name: "vector_store".to_string(), healthy: false, detail: Some("timed out".to_string()) },
            ],
        };
        assert!(!report.healthy);
        assert!(report.probes.iter().any(|p| !p.healthy));
    }
}
