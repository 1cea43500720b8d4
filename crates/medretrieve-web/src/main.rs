//! medretrieve-web server entry point.
//!
//! Run with: cargo run -p medretrieve-web

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use medretrieve_chunker::PubmedQualityScorer;
use medretrieve_common::config::AppConfig;
use medretrieve_db::{connect_and_migrate, DocumentRepository, JobRepository, VectorStore, WatermarkRepository};
use medretrieve_ingestion::{HttpSourceNormalizer, SourceNormalizer};
use medretrieve_jobs::{JobWorker, SyncJobHandler};
use medretrieve_limiter::{BreakerRegistry, ConcurrencyLimiter};
use medretrieve_retrieval::{NullEmbedder, RetrievalEngine};
use medretrieve_tools::{build_default_registry, Invoker, ToolContext};
use medretrieve_web::ready::ReadinessOrchestrator;
use medretrieve_web::router::build_router;
use medretrieve_web::state::AppState;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config_path = std::env::var("MEDRETRIEVE_CONFIG").ok().map(std::path::PathBuf::from);
    let cfg = AppConfig::load(config_path.as_deref())?;

    let pool = connect_and_migrate(&cfg.database_url).await?;
    info!("database connected and migrated");

    let vectors = VectorStore::open(&cfg.vector_store_path).await?;
    vectors.initialize().await?;
    let vectors = Arc::new(vectors);
    info!(path = %cfg.vector_store_path, "vector store ready");

    let documents = Arc::new(DocumentRepository::new(pool.clone()));
    let watermarks = Arc::new(WatermarkRepository::new(pool.clone()));
    let jobs_repo = Arc::new(JobRepository::new(pool.clone()));

    let breakers = Arc::new(BreakerRegistry::new(cfg.breaker.clone()));

    let engine = Arc::new(RetrievalEngine::new(
        vectors.clone(),
        documents.clone(),
        Arc::new(PubmedQualityScorer),
        Arc::new(NullEmbedder),
        &cfg.search_cache,
        &breakers,
    ));

    let limiter = Arc::new(ConcurrencyLimiter::new(&cfg.limiter));
    let ready = Arc::new(ReadinessOrchestrator::new(pool.clone(), vectors.clone(), cfg.ready.clone()));

    let registry = build_default_registry();
    let tool_context = ToolContext::new(engine.clone(), watermarks.clone(), jobs_repo.clone(), cfg.job.clone());
    let invoker = Arc::new(Invoker::new(registry, limiter.clone(), tool_context));

    let sources: HashMap<String, Arc<dyn SourceNormalizer>> = cfg
        .sources
        .iter()
        .map(|(name, url)| {
            let normalizer: Arc<dyn SourceNormalizer> = Arc::new(HttpSourceNormalizer::new(name.clone(), url.clone()));
            (name.clone(), normalizer)
        })
        .collect();
    info!(sources = sources.len(), "configured ingestion sources");

    let sync_handler = Arc::new(SyncJobHandler::new(
        documents.clone(),
        vectors.clone(),
        watermarks.clone(),
        cfg.chunker.clone(),
        cfg.watermark.clone(),
        Arc::new(PubmedQualityScorer),
        sources,
        breakers.clone(),
    ));
    let worker = JobWorker::new("worker-1", jobs_repo.clone(), vec![sync_handler], cfg.job.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(async move { worker.run_forever(Duration::from_secs(2), shutdown_rx).await });

    let state = AppState::new(invoker, jobs_repo, ready, engine, limiter, breakers);
    let app = build_router(state, cfg.shared_secret.clone());

    let bind_addr: SocketAddr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string()).parse()?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "medretrieve-web listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
