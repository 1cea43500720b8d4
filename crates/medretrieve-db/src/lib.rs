//! medretrieve-db — persistence layer: the relational store for Documents,
//! sync watermarks and the job queue (sqlx/Postgres), plus the LanceDB-backed
//! chunk vector store (C1/C4/C5/C6/C9 storage side).

pub mod documents;
pub mod jobs;
pub mod pool;
pub mod vector;
pub mod watermarks;

pub use documents::{DocumentRepository, UpsertOutcome};
pub use jobs::{Job, JobRepository, JobStatus};
pub use pool::connect_and_migrate;
pub use vector::{VectorStore, EMBEDDING_DIM, TABLE_CHUNKS};
pub use watermarks::{Watermark, WatermarkRepository};
