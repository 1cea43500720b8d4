//! Relational store for normalized Documents (C1/C4).
//!
//! Grounded on the teacher's `ferrumyx-ingestion/src/pg_repository.rs`
//! `upsert_paper`: a `WITH ins AS (... ON CONFLICT ... RETURNING ...)`
//! upsert, falling back to a plain SELECT when the conflict branch fired.
//! Re-targeted at content-hash idempotency (spec §4.4) instead of
//! DOI/PMID-only dedup.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use medretrieve_common::{Document, Result};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;

/// Outcome of `upsert`, distinguishing a brand-new document from an
/// unchanged-by-content-hash no-op versus a genuine content update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent upsert keyed on `uid`. Skips the write entirely (returns
    /// `Unchanged`) when the incoming content hash matches what's stored.
    pub async fn upsert(&self, doc: &Document) -> Result<(UpsertOutcome, i32)> {
        let content_hash = doc.content_hash().unwrap_or_default().to_string();
        let authors = serde_json::to_value(&doc.authors)?;
        let labels = serde_json::to_value(&doc.labels)?;
        let identifiers = serde_json::to_value(&doc.identifiers)?;
        let provenance = serde_json::to_value(&doc.provenance)?;
        let detail = serde_json::to_value(&doc.detail)?;

        let row = sqlx::query(
            r#"
            WITH ins AS (
                INSERT INTO documents
                    (uid, source, source_id, title, text, published_at, fetched_at,
                     language, authors, labels, identifiers, provenance, detail,
                     license, schema_version, version, content_hash)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,1,$16)
                ON CONFLICT (uid) DO UPDATE SET
                    title = EXCLUDED.title,
                    text = EXCLUDED.text,
                    published_at = EXCLUDED.published_at,
                    fetched_at = EXCLUDED.fetched_at,
                    language = EXCLUDED.language,
                    authors = EXCLUDED.authors,
                    labels = EXCLUDED.labels,
                    identifiers = EXCLUDED.identifiers,
                    provenance = EXCLUDED.provenance,
                    detail = EXCLUDED.detail,
                    license = EXCLUDED.license,
                    content_hash = EXCLUDED.content_hash,
                    version = documents.version + 1
                WHERE documents.content_hash IS DISTINCT FROM EXCLUDED.content_hash
                RETURNING version, (xmax = 0) AS is_new
            )
            SELECT version, is_new FROM ins
            "#,
        )
        .bind(&doc.uid)
        .bind(&doc.source)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.text)
        .bind(doc.published_at)
        .bind(doc.fetched_at)
        .bind(&doc.language)
        .bind(&authors)
        .bind(&labels)
        .bind(&identifiers)
        .bind(&provenance)
        .bind(&detail)
        .bind(&doc.license)
        .bind(doc.schema_version)
        .bind(&content_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let version: i32 = row.try_get("version")?;
                let is_new: bool = row.try_get("is_new")?;
                Ok((if is_new { UpsertOutcome::Inserted } else { UpsertOutcome::Updated }, version))
            }
            None => {
                // WHERE clause suppressed the write: content unchanged.
                let version: i32 = sqlx::query_scalar("SELECT version FROM documents WHERE uid = $1").bind(&doc.uid).fetch_one(&self.pool).await?;
                Ok((UpsertOutcome::Unchanged, version))
            }
        }
    }

    pub async fn find_by_uid(&self, uid: &str) -> Result<Option<Document>> {
        let row = sqlx::query(SELECT_DOCUMENT).bind(uid).fetch_optional(&self.pool).await?;
        row.map(row_to_document).transpose()
    }

    pub async fn list_by_source(&self, source: &str, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT uid, source, source_id, title, text, published_at, fetched_at,
                   language, authors, labels, identifiers, provenance, detail,
                   license, schema_version, version
            FROM documents
            WHERE source = $1
            ORDER BY uid
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(source)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_document).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents").fetch_one(&self.pool).await?)
    }

    pub async fn count_by_source(&self, source: &str) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE source = $1").bind(source).fetch_one(&self.pool).await?)
    }

    /// Sets (or clears) the `chunks_pending` provenance flag directly,
    /// bypassing the content-hash-gated `upsert` above — a flag flip alone
    /// must never no-op just because the document's text didn't change.
    pub async fn set_chunks_pending(&self, uid: &str, pending: bool) -> Result<()> {
        sqlx::query("UPDATE documents SET provenance = jsonb_set(provenance, '{chunks_pending}', $2::jsonb, true) WHERE uid = $1")
            .bind(uid)
            .bind(serde_json::json!(pending))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Documents for `source` still flagged `chunks_pending` from a prior
    /// failed vector-store write, oldest `uid` first, for the ingestion
    /// pipeline to retry before pulling new records.
    pub async fn list_chunks_pending(&self, source: &str, limit: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT uid, source, source_id, title, text, published_at, fetched_at,
                   language, authors, labels, identifiers, provenance, detail,
                   license, schema_version, version
            FROM documents
            WHERE source = $1 AND COALESCE((provenance->>'chunks_pending')::boolean, false)
            ORDER BY uid
            LIMIT $2
            "#,
        )
        .bind(source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_document).collect()
    }
}

const SELECT_DOCUMENT: &str = r#"
    SELECT uid, source, source_id, title, text, published_at, fetched_at,
           language, authors, labels, identifiers, provenance, detail,
           license, schema_version, version
    FROM documents
    WHERE uid = $1
"#;

fn row_to_document(row: sqlx::postgres::PgRow) -> Result<Document> {
    let authors_json: Value = row.try_get("authors")?;
    let labels_json: Value = row.try_get("labels")?;
    let identifiers_json: Value = row.try_get("identifiers")?;
    let provenance_json: Value = row.try_get("provenance")?;
    let detail_json: Value = row.try_get("detail")?;

    Ok(Document {
        uid: row.try_get("uid")?,
        source: row.try_get("source")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        text: row.try_get("text")?,
        published_at: row.try_get::<Option<DateTime<Utc>>, _>("published_at")?,
        fetched_at: row.try_get::<Option<DateTime<Utc>>, _>("fetched_at")?,
        language: row.try_get("language")?,
        authors: serde_json::from_value(authors_json).unwrap_or_default(),
        labels: serde_json::from_value::<HashSet<String>>(labels_json).unwrap_or_default(),
        identifiers: serde_json::from_value::<BTreeMap<String, String>>(identifiers_json).unwrap_or_default(),
        provenance: serde_json::from_value::<BTreeMap<String, Value>>(provenance_json).unwrap_or_default(),
        detail: serde_json::from_value::<BTreeMap<String, Value>>(detail_json).unwrap_or_default(),
        license: row.try_get("license")?,
        schema_version: row.try_get("schema_version")?,
        version: row.try_get("version")?,
    })
}
