//! `sync` job handler: runs one ingestion pass for the source named in the
//! job payload. This is the job-queue entry point for what §4.4/§4.9 call
//! "long-running tools must use the job API".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use medretrieve_chunker::QualityScorer;
use medretrieve_common::config::{ChunkerSettings, WatermarkSettings};
use medretrieve_common::{MedretrieveError, Result};
use medretrieve_db::{DocumentRepository, Job, VectorStore, WatermarkRepository};
use medretrieve_ingestion::{run_ingestion, SourceNormalizer};
use medretrieve_limiter::BreakerRegistry;
use serde_json::Value;

use crate::handler::JobHandler;
use crate::progress::ProgressReporter;

const DEFAULT_SYNC_LIMIT: usize = 100;
const MAX_OVERLAP_DAYS: i64 = 30;

pub struct SyncJobHandler {
    documents: Arc<DocumentRepository>,
    vectors: Arc<VectorStore>,
    watermarks: Arc<WatermarkRepository>,
    chunker_settings: ChunkerSettings,
    watermark_settings: WatermarkSettings,
    scorer: Arc<dyn QualityScorer>,
    sources: HashMap<String, Arc<dyn SourceNormalizer>>,
    breakers: Arc<BreakerRegistry>,
}

impl SyncJobHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<DocumentRepository>,
        vectors: Arc<VectorStore>,
        watermarks: Arc<WatermarkRepository>,
        chunker_settings: ChunkerSettings,
        watermark_settings: WatermarkSettings,
        scorer: Arc<dyn QualityScorer>,
        sources: HashMap<String, Arc<dyn SourceNormalizer>>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self { documents, vectors, watermarks, chunker_settings, watermark_settings, scorer, sources, breakers }
    }
}

#[async_trait]
impl JobHandler for SyncJobHandler {
    fn job_type(&self) -> &str {
        "sync"
    }

    async fn handle(&self, job: &Job, progress: &ProgressReporter) -> Result<Value> {
        let source_name = job
            .payload
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MedretrieveError::validation("source", "sync job payload must include a source name"))?;

        let limit = job.payload.get("limit").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_SYNC_LIMIT as u64) as usize;
        let overlap_days = job
            .payload
            .get("overlap_days")
            .and_then(|v| v.as_i64())
            .unwrap_or(self.watermark_settings.default_overlap_days)
            .clamp(0, MAX_OVERLAP_DAYS);

        let source = self
            .sources
            .get(source_name)
            .ok_or_else(|| MedretrieveError::validation("source", format!("unknown source {source_name:?}")))?
            .clone();

        progress.report(0, format!("starting sync for {source_name}")).await;

        let result = run_ingestion(
            source.as_ref(),
            self.documents.clone(),
            self.vectors.clone(),
            self.watermarks.clone(),
            &self.chunker_settings,
            self.scorer.as_ref(),
            limit,
            overlap_days,
            &self.breakers,
            None,
        )
        .await?;

        progress
            .report(
                100,
                format!(
                    "{} inserted, {} updated, {} unchanged, {} chunks",
                    result.documents_inserted, result.documents_updated, result.documents_unchanged, result.chunks_inserted
                ),
            )
            .await;

        Ok(serde_json::to_value(result)?)
    }
}
