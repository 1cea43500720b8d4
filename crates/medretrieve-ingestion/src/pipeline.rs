//! End-to-end ingestion pipeline (C4). See ARCHITECTURE §4.4.
//!
//! Orchestration shape — staged run, progress events over a broadcast
//! channel, a summary result struct — is grounded on the teacher's
//! `ferrumyx-ingestion/src/pipeline.rs::run_ingestion`, retargeted from
//! "search N literature APIs" onto "pull one SourceNormalizer, upsert,
//! chunk, advance the watermark".

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use medretrieve_chunker::{chunk_document, QualityScorer};
use medretrieve_common::config::ChunkerSettings;
use medretrieve_common::{Document, Result};
use medretrieve_db::{DocumentRepository, UpsertOutcome, VectorStore, WatermarkRepository};
use medretrieve_limiter::BreakerRegistry;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::source::SourceNormalizer;

/// Progress event emitted during a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionProgress {
    pub job_id: Uuid,
    pub source: String,
    pub stage: String,
    pub message: String,
    pub documents_found: usize,
    pub documents_upserted: usize,
    pub chunks_inserted: usize,
}

impl IngestionProgress {
    fn new(job_id: Uuid, source: &str, stage: &str, message: impl Into<String>) -> Self {
        Self {
            job_id,
            source: source.to_string(),
            stage: stage.to_string(),
            message: message.into(),
            documents_found: 0,
            documents_upserted: 0,
            chunks_inserted: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub job_id: Uuid,
    pub source: String,
    pub documents_found: usize,
    pub documents_inserted: usize,
    pub documents_updated: usize,
    pub documents_unchanged: usize,
    pub chunks_inserted: usize,
    pub chunks_pending_retried: usize,
    pub errors: Vec<String>,
    pub watermark_advanced: bool,
    pub duration_ms: u64,
}

/// Deletes a document's stale chunks, re-chunks it, and writes the new
/// chunks to the vector store, returning the chunk count written. Shared by
/// the main upsert loop and the pending-chunk retry pass so both rebuild
/// chunks identically.
async fn rebuild_chunks(
    doc: &Document,
    vectors: &VectorStore,
    chunker_settings: &ChunkerSettings,
    breakers: &BreakerRegistry,
) -> std::result::Result<usize, String> {
    let vector_breaker = breakers.get("vector_store");
    vector_breaker
        .guard(vectors.delete_by_parent_uid(&doc.uid))
        .await
        .map_err(|e| format!("chunk cleanup failed for {}: {e}", doc.uid))?;

    let chunks = chunk_document(doc, chunker_settings).map_err(|e| format!("chunking failed for {}: {e}", doc.uid))?;
    if chunks.is_empty() {
        return Ok(0);
    }

    let embeddings = vec![None; chunks.len()];
    vector_breaker
        .guard(vectors.insert_chunks(&chunks, &embeddings))
        .await
        .map_err(|e| format!("chunk insert failed for {}: {e}", doc.uid))?;
    Ok(chunks.len())
}

/// Runs one ingestion pass for `source`: retries any documents still flagged
/// `chunks_pending` from a prior failed write, pulls everything newer than
/// the current watermark minus `overlap_days` (up to `limit` records),
/// upserts each as a Document, rebuilds its chunks when content actually
/// changed, and advances the watermark to the newest record seen.
/// Non-destructive: a single record's failure is logged and counted, not
/// fatal to the run.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(source, documents, vectors, watermarks, chunker_settings, scorer, breakers, progress_tx))]
pub async fn run_ingestion(
    source: &dyn SourceNormalizer,
    documents: Arc<DocumentRepository>,
    vectors: Arc<VectorStore>,
    watermarks: Arc<WatermarkRepository>,
    chunker_settings: &ChunkerSettings,
    scorer: &dyn QualityScorer,
    limit: usize,
    overlap_days: i64,
    breakers: &BreakerRegistry,
    progress_tx: Option<broadcast::Sender<IngestionProgress>>,
) -> Result<IngestionResult> {
    let db_breaker = breakers.get("relational_db");
    let job_id = Uuid::new_v4();
    let source_name = source.name().to_string();
    let t0 = std::time::Instant::now();

    let emit = |stage: &str, message: String, progress: &mut IngestionProgress| {
        progress.stage = stage.to_string();
        progress.message = message;
        if let Some(tx) = &progress_tx {
            let _ = tx.send(progress.clone());
        }
    };

    let mut progress = IngestionProgress::new(job_id, &source_name, "fetch", "");

    let mut result = IngestionResult {
        job_id,
        source: source_name.clone(),
        documents_found: 0,
        documents_inserted: 0,
        documents_updated: 0,
        documents_unchanged: 0,
        chunks_inserted: 0,
        chunks_pending_retried: 0,
        errors: Vec::new(),
        watermark_advanced: false,
        duration_ms: 0,
    };

    let pending = db_breaker.guard(documents.list_chunks_pending(&source_name, limit as i64)).await?;
    if !pending.is_empty() {
        emit("retry", format!("retrying {} documents with pending chunk writes", pending.len()), &mut progress);
    }
    for doc in &pending {
        match rebuild_chunks(doc, &vectors, chunker_settings, breakers).await {
            Ok(count) => {
                if count > 0 {
                    result.chunks_inserted += count;
                    result.chunks_pending_retried += 1;
                    progress.chunks_inserted += count;
                }
                if let Err(e) = db_breaker.guard(documents.set_chunks_pending(&doc.uid, false)).await {
                    warn!(uid = %doc.uid, error = %e, "failed to clear chunks_pending flag after retry");
                }
            }
            Err(message) => {
                warn!(uid = %doc.uid, error = %message, "pending chunk retry failed again");
                result.errors.push(message);
            }
        }
    }

    let current = db_breaker.guard(watermarks.get(&source_name)).await?;
    let cursor = current.as_ref().map(|w| w.cursor - Duration::days(overlap_days.max(0)));

    info!(job_id = %job_id, source = %source_name, ?cursor, overlap_days, "starting ingestion pass");
    emit("fetch", format!("fetching since {cursor:?}"), &mut progress);

    let source_breaker = breakers.get(&format!("source:{source_name}"));
    let raw_records = source_breaker.guard(source.fetch_since(cursor, limit)).await?;
    result.documents_found = raw_records.len();
    progress.documents_found = raw_records.len();
    emit("upsert", format!("{} records fetched", raw_records.len()), &mut progress);

    let mut newest_seen: Option<DateTime<Utc>> = None;

    for raw in raw_records {
        let mut doc = match raw.into_document(&source_name) {
            Ok(doc) => doc,
            Err(e) => {
                result.errors.push(format!("normalize failed: {e}"));
                continue;
            }
        };

        let quality = scorer.score(&doc);
        doc.provenance.insert("quality_score".to_string(), serde_json::json!(quality));
        doc.refresh_content_hash();

        let candidate_cursor = doc.published_at.or(doc.fetched_at);
        if let Some(c) = candidate_cursor {
            newest_seen = Some(newest_seen.map_or(c, |prev| prev.max(c)));
        }

        let (outcome, _version) = match db_breaker.guard(documents.upsert(&doc)).await {
            Ok(r) => r,
            Err(e) => {
                warn!(uid = %doc.uid, error = %e, "document upsert failed");
                result.errors.push(format!("upsert failed for {}: {e}", doc.uid));
                continue;
            }
        };

        match outcome {
            UpsertOutcome::Inserted => result.documents_inserted += 1,
            UpsertOutcome::Updated => result.documents_updated += 1,
            UpsertOutcome::Unchanged => {
                result.documents_unchanged += 1;
                continue;
            }
        }

        match rebuild_chunks(&doc, &vectors, chunker_settings, breakers).await {
            Ok(count) => {
                if count > 0 {
                    result.chunks_inserted += count;
                    progress.documents_upserted += 1;
                    progress.chunks_inserted += count;
                }
                if let Err(e) = db_breaker.guard(documents.set_chunks_pending(&doc.uid, false)).await {
                    warn!(uid = %doc.uid, error = %e, "failed to clear chunks_pending flag");
                }
            }
            Err(message) => {
                warn!(uid = %doc.uid, error = %message, "chunk rebuild failed, marking chunks_pending");
                result.errors.push(message);
                if let Err(e) = db_breaker.guard(documents.set_chunks_pending(&doc.uid, true)).await {
                    warn!(uid = %doc.uid, error = %e, "failed to persist chunks_pending flag");
                }
            }
        }
    }

    if let Some(newest) = newest_seen {
        let (_watermark, advanced) = db_breaker.guard(watermarks.advance(&source_name, newest)).await?;
        result.watermark_advanced = advanced;
    }

    result.duration_ms = t0.elapsed().as_millis() as u64;

    emit(
        "complete",
        format!(
            "done: {} inserted, {} updated, {} unchanged, {} chunks",
            result.documents_inserted, result.documents_updated, result.documents_unchanged, result.chunks_inserted
        ),
        &mut progress,
    );

    info!(
        job_id = %job_id,
        source = %source_name,
        inserted = result.documents_inserted,
        updated = result.documents_updated,
        unchanged = result.documents_unchanged,
        chunks = result.chunks_inserted,
        duration_ms = result.duration_ms,
        errors = result.errors.len(),
        "ingestion pass complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawRecord;
    use async_trait::async_trait;
    use medretrieve_chunker::PubmedQualityScorer;
    use std::sync::Mutex;

    struct FixedSource {
        records: Mutex<Vec<RawRecord>>,
    }

    #[async_trait]
    impl SourceNormalizer for FixedSource {
        fn name(&self) -> &str {
            "pubmed"
        }

        async fn fetch_since(&self, _cursor: Option<DateTime<Utc>>, _limit: usize) -> Result<Vec<RawRecord>> {
            Ok(std::mem::take(&mut *self.records.lock().unwrap()))
        }
    }

    #[test]
    fn progress_event_carries_job_and_source() {
        let job_id = Uuid::new_v4();
        let p = IngestionProgress::new(job_id, "pubmed", "fetch", "starting");
        assert_eq!(p.job_id, job_id);
        assert_eq!(p.source, "pubmed");
        assert_eq!(p.stage, "fetch");
    }

    #[tokio::test]
    async fn empty_source_yields_empty_result_without_touching_watermark() {
        // This exercises only the parts of run_ingestion reachable without a
        // live Postgres/LanceDB handle: fetch_since on an empty source.
        let source = FixedSource { records: Mutex::new(Vec::new()) };
        let records = source.fetch_since(None, 10).await.unwrap();
        assert!(records.is_empty());
        let _ = PubmedQualityScorer;
    }
}
