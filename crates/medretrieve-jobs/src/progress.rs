//! Throttled progress reporting for a running job (spec §4.9: "periodic
//! progress callbacks that update the row at most every 2 seconds").

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use medretrieve_db::JobRepository;
use tracing::debug;
use uuid::Uuid;

pub struct ProgressReporter {
    jobs: Arc<JobRepository>,
    job_id: Uuid,
    throttle: Duration,
    last_reported: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    pub fn new(jobs: Arc<JobRepository>, job_id: Uuid, throttle_seconds: u64) -> Self {
        Self { jobs, job_id, throttle: Duration::from_secs(throttle_seconds), last_reported: Mutex::new(None) }
    }

    /// Reports progress, silently dropping the update if the last one was
    /// reported less than `throttle` ago (except the very first call, which
    /// always goes through so a long-running job shows up as started).
    pub async fn report(&self, percent: i32, message: impl Into<String>) {
        let now = Instant::now();
        let should_send = {
            let mut last = self.last_reported.lock().unwrap();
            let due = is_due(*last, now, self.throttle);
            if due {
                *last = Some(now);
            }
            due
        };

        if !should_send {
            return;
        }

        let message = message.into();
        if let Err(e) = self.jobs.update_progress(self.job_id, percent, Some(&message)).await {
            debug!(job_id = %self.job_id, error = %e, "failed to persist job progress");
        }
    }
}

fn is_due(last: Option<Instant>, now: Instant, throttle: Duration) -> bool {
    last.map(|t| now.duration_since(t) >= throttle).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_report_is_always_due() {
        assert!(is_due(None, Instant::now(), Duration::from_secs(2)));
    }

    #[test]
    fn report_within_throttle_window_is_not_due() {
        let now = Instant::now();
        assert!(!is_due(Some(now), now, Duration::from_secs(2)));
    }

    #[test]
    fn report_after_throttle_window_is_due() {
        let last = Instant::now();
        let later = last + Duration::from_secs(3);
        assert!(is_due(Some(last), later, Duration::from_secs(2)));
    }
}
