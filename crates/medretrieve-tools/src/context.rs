//! Shared handles each tool needs to do its work. One `ToolContext` is built
//! once at startup and cloned (cheaply, everything inside is an `Arc`) per
//! invocation.

use std::sync::Arc;

use medretrieve_common::config::JobSettings;
use medretrieve_db::{JobRepository, WatermarkRepository};
use medretrieve_retrieval::RetrievalEngine;

#[derive(Clone)]
pub struct ToolContext {
    pub engine: Arc<RetrievalEngine>,
    pub watermarks: Arc<WatermarkRepository>,
    pub jobs: Arc<JobRepository>,
    pub job_settings: JobSettings,
}

impl ToolContext {
    pub fn new(
        engine: Arc<RetrievalEngine>,
        watermarks: Arc<WatermarkRepository>,
        jobs: Arc<JobRepository>,
        job_settings: JobSettings,
    ) -> Self {
        Self { engine, watermarks, jobs, job_settings }
    }
}
