//! Source fetch boundary (C4). See ARCHITECTURE §1, §4.4.
//!
//! Fetching and parsing a literature source's native wire format (PubMed
//! eutils XML and friends) is explicitly out of scope here; a
//! `SourceNormalizer` is the seam at which an already-fetched, already-parsed
//! batch of records enters the pipeline as `Document`s. Grounded on the
//! teacher's `sources::LiteratureSource` trait boundary in
//! `ferrumyx-ingestion/src/sources/pubmed.rs`, stripped of its quick-xml body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medretrieve_common::{Document, Result};

/// One normalized record as returned by an upstream source, before it is
/// turned into a validated `Document`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawRecord {
    pub source_id: String,
    pub title: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

/// A literature source the ingestion pipeline can pull new/changed records
/// from, ordered by a monotonic cursor (typically `published_at`).
#[async_trait]
pub trait SourceNormalizer: Send + Sync {
    /// Stable lowercase identifier, e.g. `"pubmed"` — must satisfy
    /// `Document`'s `[a-z0-9]+` source constraint.
    fn name(&self) -> &str;

    /// Fetches up to `limit` records newer than `cursor` (exclusive), already
    /// sorted ascending by their own cursor field.
    async fn fetch_since(&self, cursor: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<RawRecord>>;
}

impl RawRecord {
    pub fn into_document(self, source: &str) -> Result<Document> {
        let mut doc = Document::new(source, self.source_id, self.title, self.text)?;
        doc.published_at = self.published_at;
        doc.fetched_at = Some(Utc::now());
        doc.authors = self.authors;
        doc.detail = self.detail.into_iter().collect();
        doc.refresh_content_hash();
        Ok(doc)
    }
}

/// Fetches records from a JSON HTTP endpoint returning `Vec<RawRecord>`. This
/// is the shipped normalizer: it treats the upstream literature source as an
/// already-normalized JSON feed, consistent with PubMed-style record fetching
/// and parsing being an external, out-of-scope concern.
pub struct HttpSourceNormalizer {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpSourceNormalizer {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build().expect("reqwest client"),
        }
    }
}

#[async_trait]
impl SourceNormalizer for HttpSourceNormalizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_since(&self, cursor: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<RawRecord>> {
        let mut req = self.client.get(&self.base_url).query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            req = req.query(&[("since", cursor.to_rfc3339())]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| medretrieve_common::MedretrieveError::Upstream(format!("{} fetch: {e}", self.name)))?;

        if !resp.status().is_success() {
            return Err(medretrieve_common::MedretrieveError::Upstream(format!("{} fetch: HTTP {}", self.name, resp.status())));
        }

        resp.json::<Vec<RawRecord>>()
            .await
            .map_err(|e| medretrieve_common::MedretrieveError::Upstream(format!("{} decode: {e}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_converts_into_validated_document() {
        let raw = RawRecord {
            source_id: "123".into(),
            title: Some("A Title".into()),
            text: "Body text.".into(),
            published_at: None,
            authors: vec!["Smith J".into()],
            detail: Default::default(),
        };
        let doc = raw.into_document("pubmed").unwrap();
        assert_eq!(doc.uid, "pubmed:123");
        assert_eq!(doc.authors, vec!["Smith J".to_string()]);
    }
}
