//! `GET /metrics` — a supplemented JSON snapshot (not in the minimal tool
//! catalog, but implied by §4.9's "observability contract" and §4.8's
//! breaker/limiter state).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use medretrieve_db::JobStatus;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
struct BreakerSnapshot {
    name: String,
    open: bool,
}

#[derive(Debug, Serialize)]
struct MetricsSnapshot {
    queued_jobs: usize,
    running_jobs: usize,
    global_concurrency_available: usize,
    search_cache_hits: u64,
    search_cache_misses: u64,
    search_cache_hit_rate: f64,
    breakers: Vec<BreakerSnapshot>,
}

pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    // No dedicated count query exists on JobRepository; a list call is good
    // enough for a metrics snapshot at the scale this table runs at.
    let queued = state.jobs.list(Some(JobStatus::Queued), 10_000, 0).await.map(|j| j.len()).unwrap_or(0);
    let running = state.jobs.list(Some(JobStatus::Running), 10_000, 0).await.map(|j| j.len()).unwrap_or(0);

    let cache_stats = state.engine.cache_stats();

    let breakers = ["vector_store", "relational_db"]
        .iter()
        .map(|name| BreakerSnapshot { name: name.to_string(), open: state.breakers.get(name).is_open() })
        .collect();

    Json(MetricsSnapshot {
        queued_jobs: queued,
        running_jobs: running,
        global_concurrency_available: state.limiter.global_available(),
        search_cache_hits: cache_stats.hits,
        search_cache_misses: cache_stats.misses,
        search_cache_hit_rate: cache_stats.hit_rate(),
        breakers,
    })
}
