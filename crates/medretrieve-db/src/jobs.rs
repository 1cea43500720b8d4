//! Async job queue (C9). See ARCHITECTURE §4.9.
//!
//! `claim_next` uses `SELECT ... FOR UPDATE SKIP LOCKED` so multiple worker
//! processes can poll the same table without double-processing a row — the
//! idiom the pack's job-queue examples (context-harness, zen-db) converge on.
//! `create` deduplicates on `idempotency_key` within a rolling window, in the
//! spirit of the teacher's `upsert_paper` DOI/PMID dedup.

use chrono::{DateTime, Duration, Utc};
use medretrieve_common::{ErrorCode, MedretrieveError, Result};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(MedretrieveError::Invariant(format!("unknown job status {other:?}"))),
        }
    }

    /// True once the job will never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub result: Option<Value>,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub locked_by: Option<String>,
}

fn row_to_job(row: PgRow) -> Result<Job> {
    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        idempotency_key: row.try_get("idempotency_key")?,
        status: JobStatus::parse(&row.try_get::<String, _>("status")?)?,
        attempts: row.try_get("attempts")?,
        max_retries: row.try_get("max_retries")?,
        last_error: row.try_get("last_error")?,
        result: row.try_get("result")?,
        progress_percent: row.try_get("progress_percent")?,
        progress_message: row.try_get("progress_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        scheduled_at: row.try_get("scheduled_at")?,
        locked_by: row.try_get("locked_by")?,
    })
}

const SELECT_JOB: &str = r#"
    SELECT id, job_type, payload, idempotency_key, status, attempts, max_retries,
           last_error, result, progress_percent, progress_message,
           created_at, updated_at, scheduled_at, locked_by
    FROM jobs
"#;

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a job, or returns the existing one if `idempotency_key` was
    /// already submitted within `dedup_window`.
    pub async fn create(
        &self,
        job_type: &str,
        payload: Value,
        idempotency_key: Option<&str>,
        max_retries: i32,
        dedup_window: Duration,
    ) -> Result<(Job, bool)> {
        if let Some(key) = idempotency_key {
            let cutoff = Utc::now() - dedup_window;
            let existing = sqlx::query(&format!("{SELECT_JOB} WHERE idempotency_key = $1 AND created_at > $2 ORDER BY created_at DESC LIMIT 1"))
                .bind(key)
                .bind(cutoff)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = existing {
                return Ok((row_to_job(row)?, false));
            }
        }

        let row = sqlx::query(&format!(
            "{SELECT_JOB_INSERT_INTO} VALUES ($1, $2, $3, 'queued', 0, $4, now(), now(), now()) RETURNING *"
        ))
        .bind(job_type)
        .bind(&payload)
        .bind(idempotency_key)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await?;

        Ok((row_to_job(row)?, true))
    }

    /// Claims the oldest queued, due job for `worker_id`, skipping rows
    /// locked by a concurrent claimer instead of blocking on them.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query(&format!(
            "{SELECT_JOB} WHERE status = 'queued' AND scheduled_at <= now() ORDER BY scheduled_at, created_at LIMIT 1 FOR UPDATE SKIP LOCKED"
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };
        let job = row_to_job(row)?;

        let updated = sqlx::query(&format!(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, locked_by = $1, updated_at = now() \
             WHERE id = $2 RETURNING *"
        ))
        .bind(worker_id)
        .bind(job.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row_to_job(updated)?))
    }

    pub async fn complete(&self, id: Uuid, result: Value) -> Result<Job> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'succeeded', result = $1, updated_at = now() WHERE id = $2 \
             RETURNING *"
        ))
        .bind(&result)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row_to_job(row)
    }

    /// Fails a job, retrying with the given backoff schedule unless
    /// `error_code` is terminal (§7) or retries are exhausted.
    pub async fn fail(&self, id: Uuid, error_code: ErrorCode, message: &str, backoff_seconds: &[u64]) -> Result<Job> {
        let current = self.get(id).await?.ok_or_else(|| MedretrieveError::NotFound(format!("job {id}")))?;

        let should_retry = !error_code.is_terminal() && (current.attempts as usize) <= backoff_seconds.len();

        let row = if should_retry {
            let base_delay = backoff_seconds[(current.attempts as usize).saturating_sub(1).min(backoff_seconds.len() - 1)];
            let delay = jittered(base_delay);
            sqlx::query(&format!(
                "UPDATE jobs SET status = 'queued', last_error = $1, scheduled_at = now() + ($2 || ' seconds')::interval, updated_at = now() \
                 WHERE id = $3 RETURNING *"
            ))
            .bind(message)
            .bind(delay.to_string())
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "UPDATE jobs SET status = 'failed', last_error = $1, updated_at = now() WHERE id = $2 \
                 RETURNING *"
            ))
            .bind(message)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        };

        row_to_job(row)
    }

    /// Records worker progress. Callers throttle this themselves (spec §4.9:
    /// at most every `progress_throttle_seconds`); only running jobs accept
    /// an update, so a late callback after cancellation is a harmless no-op.
    pub async fn update_progress(&self, id: Uuid, percent: i32, message: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET progress_percent = $1, progress_message = $2, updated_at = now() WHERE id = $3 AND status = 'running'",
        )
        .bind(percent.clamp(0, 100))
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Job> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'cancelled', updated_at = now() WHERE id = $1 AND status IN ('queued', 'running') \
             RETURNING *"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job(row),
            None => {
                let job = self.get(id).await?.ok_or_else(|| MedretrieveError::NotFound(format!("job {id}")))?;
                Err(MedretrieveError::Conflict(format!("job {id} already terminal ({})", job.status.as_str())))
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("{SELECT_JOB} WHERE id = $1")).bind(id).fetch_optional(&self.pool).await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: i64, offset: i64) -> Result<Vec<Job>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(&format!("{SELECT_JOB} WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"))
                    .bind(s.as_str())
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{SELECT_JOB} ORDER BY created_at DESC LIMIT $1 OFFSET $2"))
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(row_to_job).collect()
    }
}

const SELECT_JOB_INSERT_INTO: &str = "INSERT INTO jobs (job_type, payload, idempotency_key, status, attempts, max_retries, created_at, updated_at, scheduled_at)";

/// Applies the spec's ±20% retry jitter to a backoff seconds value.
fn jittered(base_seconds: u64) -> u64 {
    use rand::Rng;
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    ((base_seconds as f64) * factor).round().max(1.0) as u64
}

#[cfg(test)]
mod jitter_tests {
    use super::jittered;

    #[test]
    fn jitter_stays_within_twenty_percent_of_base() {
        for _ in 0..200 {
            let delay = jittered(45);
            assert!(delay >= 36 && delay <= 54, "delay {delay} outside expected jitter band");
        }
    }
}
