//! medretrieve-jobs — the async job queue worker (C9): claims queued jobs
//! with `SELECT ... FOR UPDATE SKIP LOCKED`, dispatches to a per-job-type
//! handler, reports throttled progress, and classifies failures for retry.

pub mod handler;
pub mod progress;
pub mod sync_handler;
pub mod worker;

pub use handler::JobHandler;
pub use progress::ProgressReporter;
pub use sync_handler::SyncJobHandler;
pub use worker::JobWorker;
