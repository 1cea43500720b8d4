//! Sync watermark / checkpoint store (C5). See ARCHITECTURE §4.5.
//!
//! `advance` is a single conditional UPDATE so two concurrent sync workers
//! racing on the same source can never move the watermark backwards.
//! `set` is the admin escape hatch and always writes an audit row, grounded
//! on the teacher's `pg_repository.rs::log_audit` pattern.

use chrono::{DateTime, Utc};
use medretrieve_common::{MedretrieveError, Result};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Watermark {
    pub source: String,
    pub cursor: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct WatermarkRepository {
    pool: PgPool,
}

impl WatermarkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, source: &str) -> Result<Option<Watermark>> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT source, cursor, updated_at FROM sync_watermarks WHERE source = $1",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(source, cursor, updated_at)| Watermark { source, cursor, updated_at }))
    }

    /// Moves the watermark forward to `candidate` iff it is strictly newer
    /// than the stored value (or no row exists yet). Returns the watermark
    /// actually in effect after the call, plus whether it advanced.
    pub async fn advance(&self, source: &str, candidate: DateTime<Utc>) -> Result<(Watermark, bool)> {
        let advanced = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO sync_watermarks (source, cursor, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (source) DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = now()
            WHERE sync_watermarks.cursor < EXCLUDED.cursor
            RETURNING source, cursor, updated_at
            "#,
        )
        .bind(source)
        .bind(candidate)
        .fetch_optional(&self.pool)
        .await?;

        match advanced {
            Some((source, cursor, updated_at)) => Ok((Watermark { source, cursor, updated_at }, true)),
            None => {
                let existing = self.get(source).await?.ok_or_else(|| {
                    MedretrieveError::Invariant(format!("watermark advance no-op but no row exists for {source}"))
                })?;
                Ok((existing, false))
            }
        }
    }

    /// Unconditional administrative override; always audited.
    pub async fn set(&self, source: &str, value: DateTime<Utc>, changed_by: &str, reason: &str) -> Result<Watermark> {
        let old = self.get(source).await?;

        let row = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO sync_watermarks (source, cursor, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (source) DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = now()
            RETURNING source, cursor, updated_at
            "#,
        )
        .bind(source)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO watermark_audit (source, old_cursor, new_cursor, changed_by, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(source)
        .bind(old.map(|w| w.cursor))
        .bind(value)
        .bind(changed_by)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(Watermark { source: row.0, cursor: row.1, updated_at: row.2 })
    }
}
