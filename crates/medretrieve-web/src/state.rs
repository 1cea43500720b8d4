//! Shared application state for the HTTP transport.

use std::sync::Arc;

use medretrieve_db::JobRepository;
use medretrieve_limiter::{BreakerRegistry, ConcurrencyLimiter};
use medretrieve_retrieval::RetrievalEngine;
use medretrieve_tools::Invoker;

use crate::ready::ReadinessOrchestrator;

/// Shared state injected into every Axum handler. `engine`, `limiter` and
/// `breakers` duplicate handles already held inside `invoker`/job handlers;
/// they're kept here too purely for `/metrics` to read without punching a
/// hole through the tool abstraction.
#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<Invoker>,
    pub jobs: Arc<JobRepository>,
    pub ready: Arc<ReadinessOrchestrator>,
    pub engine: Arc<RetrievalEngine>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub breakers: Arc<BreakerRegistry>,
}

impl AppState {
    pub fn new(
        invoker: Arc<Invoker>,
        jobs: Arc<JobRepository>,
        ready: Arc<ReadinessOrchestrator>,
        engine: Arc<RetrievalEngine>,
        limiter: Arc<ConcurrencyLimiter>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self { invoker, jobs, ready, engine, limiter, breakers }
    }
}

pub type SharedState = Arc<AppState>;
