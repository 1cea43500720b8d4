//! The per-job-type handler seam the worker dispatches to.

use async_trait::async_trait;
use medretrieve_common::Result;
use medretrieve_db::Job;
use serde_json::Value;

use crate::progress::ProgressReporter;

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &str;

    async fn handle(&self, job: &Job, progress: &ProgressReporter) -> Result<Value>;
}
