//! medretrieve-ingestion — the ingestion pipeline (C4): pulls normalized
//! records from a source, upserts them idempotently, chunks and scores
//! what changed, and advances the source's sync watermark.

pub mod pipeline;
pub mod source;

pub use pipeline::{run_ingestion, IngestionProgress, IngestionResult};
pub use source::{HttpSourceNormalizer, RawRecord, SourceNormalizer};
