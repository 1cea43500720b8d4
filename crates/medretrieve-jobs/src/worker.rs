//! The job worker loop (C9). Workers compete for rows via
//! `JobRepository::claim_next`'s `SELECT ... FOR UPDATE SKIP LOCKED`; no
//! leader election is needed (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use medretrieve_common::config::JobSettings;
use medretrieve_common::Result;
use medretrieve_db::{Job, JobRepository};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::handler::JobHandler;
use crate::progress::ProgressReporter;

pub struct JobWorker {
    worker_id: String,
    repository: Arc<JobRepository>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    settings: JobSettings,
}

impl JobWorker {
    pub fn new(worker_id: impl Into<String>, repository: Arc<JobRepository>, handlers: Vec<Arc<dyn JobHandler>>, settings: JobSettings) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.job_type().to_string(), h)).collect();
        Self { worker_id: worker_id.into(), repository, handlers, settings }
    }

    /// Claims and runs at most one job. Returns `true` if a job was claimed
    /// (whether it ultimately succeeded or failed), `false` if the queue was
    /// empty.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.repository.claim_next(&self.worker_id).await? else {
            return Ok(false);
        };

        self.process(job).await;
        Ok(true)
    }

    async fn process(&self, job: Job) {
        info!(job_id = %job.id, job_type = %job.job_type, worker = %self.worker_id, "claimed job");

        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            warn!(job_id = %job.id, job_type = %job.job_type, "no handler registered for job type");
            let _ = self
                .repository
                .fail(job.id, medretrieve_common::ErrorCode::Validation, &format!("no handler for job type {:?}", job.job_type), &[])
                .await;
            return;
        };

        let progress = ProgressReporter::new(self.repository.clone(), job.id, self.settings.progress_throttle_seconds);

        match handler.handle(&job, &progress).await {
            Ok(result) => {
                if let Err(e) = self.repository.complete(job.id, result).await {
                    error!(job_id = %job.id, error = %e, "failed to persist job completion");
                }
                info!(job_id = %job.id, "job succeeded");
            }
            Err(e) => {
                let code = e.code();
                warn!(job_id = %job.id, error_code = code.as_str(), error = %e, "job failed");
                if let Err(persist_err) = self.repository.fail(job.id, code, &e.user_message(), &self.settings.retry_backoff_seconds).await {
                    error!(job_id = %job.id, error = %persist_err, "failed to persist job failure");
                }
            }
        }
    }

    /// Polls forever until `shutdown` signals true, sleeping `poll_interval`
    /// between empty polls so idle workers don't spin.
    pub async fn run_forever(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!(worker = %self.worker_id, "shutdown requested, stopping worker loop");
                return;
            }

            let claimed = tokio::select! {
                result = self.run_once() => result,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            };

            match claimed {
                Ok(true) => continue,
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(worker = %self.worker_id, error = %e, "error polling for jobs");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> &str {
            "echo"
        }

        async fn handle(&self, _job: &Job, _progress: &ProgressReporter) -> Result<Value> {
            Ok(serde_json::json!({"echoed": true}))
        }
    }

    #[test]
    fn handler_registry_keys_by_job_type() {
        let handlers: Vec<Arc<dyn JobHandler>> = vec![Arc::new(EchoHandler)];
        let by_type: HashMap<String, Arc<dyn JobHandler>> = handlers.into_iter().map(|h| (h.job_type().to_string(), h)).collect();
        assert!(by_type.contains_key("echo"));
    }
}
