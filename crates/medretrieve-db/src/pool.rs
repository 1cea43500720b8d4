//! Connection pool bootstrap: connect, then run embedded migrations so the
//! relational schema (documents, sync_watermarks, watermark_audit, jobs) is
//! always at the expected version before anything else touches the pool.

use medretrieve_common::{MedretrieveError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

fn pool_err(e: sqlx::Error) -> MedretrieveError {
    MedretrieveError::Unavailable(format!("database pool: {e}"))
}

pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await.map_err(pool_err)?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| MedretrieveError::Unavailable(format!("migration failed: {e}")))?;
    Ok(pool)
}

/// `(applied, expected)` migration counts, for the readiness orchestrator's
/// "tables present at the expected migration version" probe (spec §4.10).
pub async fn migration_status(pool: &PgPool) -> Result<(i64, i64)> {
    let expected = sqlx::migrate!("./migrations").iter().count() as i64;
    let applied: (i64,) = sqlx::query_as("SELECT count(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .map_err(pool_err)?;
    Ok((applied.0, expected))
}
