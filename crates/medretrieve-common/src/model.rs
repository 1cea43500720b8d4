//! Canonical Document/Chunk model (C1).
//!
//! Construction enforces every invariant in spec §3 up front so that every
//! other component can treat a `Document`/`Chunk` value as already-valid.
//! See ARCHITECTURE §3 (Data model).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{MedretrieveError, Result};

/// Fixed UUIDv5 namespace for chunk identities. This is an Open Question in
/// spec §9 ("UUID namespace value") — decided once here and never changed;
/// see DESIGN.md.
pub const NS_CHUNK: Uuid = Uuid::from_bytes([
    0x6f, 0x3b, 0x1d, 0x4a, 0x8c, 0x2e, 0x4f, 0x61, 0x9a, 0x7d, 0x3c, 0x5e, 0x2b, 0x90, 0x1a, 0x44,
]);

/// Coarse structural label attached to a Chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Background,
    Methods,
    Results,
    Conclusions,
    Other,
    Unstructured,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Background => "Background",
            Section::Methods => "Methods",
            Section::Results => "Results",
            Section::Conclusions => "Conclusions",
            Section::Other => "Other",
            Section::Unstructured => "Unstructured",
        }
    }

    /// Reconstruction sort priority: Background=0 .. Unstructured=5 (spec §4.6 step 3).
    pub fn priority(&self) -> u8 {
        match self {
            Section::Background => 0,
            Section::Methods => 1,
            Section::Results => 2,
            Section::Conclusions => 3,
            Section::Other => 4,
            Section::Unstructured => 5,
        }
    }
}

/// Canonical normalized record for a single source item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub uid: String,
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub authors: Vec<String>,
    pub labels: HashSet<String>,
    pub identifiers: BTreeMap<String, String>,
    pub provenance: BTreeMap<String, Value>,
    pub detail: BTreeMap<String, Value>,
    pub license: Option<String>,
    pub schema_version: i32,
    /// Monotonic row version, bumped by the ingestion pipeline's upsert (§4.4 step 5).
    pub version: i32,
}

impl Document {
    /// Construct and validate a Document in one step (§4.1: enforce invariants
    /// at construction time, no I/O).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        title: Option<String>,
        text: impl Into<String>,
    ) -> Result<Self> {
        let source = source.into();
        let source_id = source_id.into();
        let text = text.into();

        validate_source(&source)?;
        if source_id.is_empty() {
            return Err(MedretrieveError::validation("source_id", "must be non-empty"));
        }
        if text.is_empty() {
            return Err(MedretrieveError::validation("text", "must be non-empty"));
        }

        let uid = format!("{source}:{source_id}");

        let mut doc = Self {
            uid,
            source,
            source_id,
            title,
            text,
            published_at: None,
            fetched_at: None,
            language: None,
            authors: Vec::new(),
            labels: HashSet::new(),
            identifiers: BTreeMap::new(),
            provenance: BTreeMap::new(),
            detail: BTreeMap::new(),
            license: None,
            schema_version: 1,
            version: 1,
        };

        let hash = doc.compute_content_hash();
        doc.provenance.insert("content_hash".to_string(), Value::String(hash));
        Ok(doc)
    }

    /// `sha256(title || " " || text)`, recomputed whenever title/text change.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_deref().unwrap_or("").as_bytes());
        hasher.update(b" ");
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.provenance.get("content_hash").and_then(|v| v.as_str())
    }

    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title.as_deref().unwrap_or(""), self.text)
    }

    /// Re-derives the content hash and stores it. Call after mutating title/text.
    pub fn refresh_content_hash(&mut self) {
        let hash = self.compute_content_hash();
        self.provenance.insert("content_hash".to_string(), Value::String(hash));
    }
}

fn validate_source(source: &str) -> Result<()> {
    let is_valid = !source.is_empty() && source.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !is_valid {
        return Err(MedretrieveError::validation("source", format!("must match [a-z0-9]+, got {source:?}")));
    }
    Ok(())
}

/// Embedding unit derived from a Document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub uuid: Uuid,
    pub parent_uid: String,
    pub source: String,
    pub chunk_idx: u32,
    pub text: String,
    pub title: Option<String>,
    pub section: Section,
    pub published_at: Option<DateTime<Utc>>,
    pub tokens: u32,
    pub n_sentences: u32,
    pub meta: BTreeMap<String, Value>,
}

impl Chunk {
    /// `UUIDv5(NS_CHUNK, parent_uid + ":" + chunk_id)` — a pure function of
    /// (parent_uid, chunk_id); never depends on content.
    pub fn derive_uuid(parent_uid: &str, chunk_id: &str) -> Uuid {
        let name = format!("{parent_uid}:{chunk_id}");
        Uuid::new_v5(&NS_CHUNK, name.as_bytes())
    }

    pub fn new(
        parent: &Document,
        chunk_id: String,
        chunk_idx: u32,
        text: String,
        section: Section,
        tokens: u32,
        n_sentences: u32,
        meta: BTreeMap<String, Value>,
    ) -> Result<Self> {
        if !CHUNK_ID_RE.is_match(&chunk_id) {
            return Err(MedretrieveError::validation("chunk_id", format!("must match ^[sw]\\d+$, got {chunk_id:?}")));
        }
        if text.is_empty() {
            return Err(MedretrieveError::validation("text", "chunk text must be non-empty"));
        }
        let uuid = Self::derive_uuid(&parent.uid, &chunk_id);
        Ok(Self {
            chunk_id,
            uuid,
            parent_uid: parent.uid.clone(),
            source: parent.source.clone(),
            chunk_idx,
            text,
            title: parent.title.clone(),
            section,
            published_at: parent.published_at,
            tokens,
            n_sentences,
            meta,
        })
    }
}

// A plain static avoids pulling lazy_static into this crate for one regex.
static CHUNK_ID_RE_CELL: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
#[allow(non_upper_case_globals)]
struct ChunkIdRe;
impl std::ops::Deref for ChunkIdRe {
    type Target = regex::Regex;
    fn deref(&self) -> &regex::Regex {
        CHUNK_ID_RE_CELL.get_or_init(|| regex::Regex::new(r"^[sw]\d+$").unwrap())
    }
}
static CHUNK_ID_RE: ChunkIdRe = ChunkIdRe;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_is_source_colon_source_id() {
        let doc = Document::new("pubmed", "12345678", None, "some text").unwrap();
        assert_eq!(doc.uid, "pubmed:12345678");
    }

    #[test]
    fn rejects_bad_source() {
        let err = Document::new("PubMed", "1", None, "x").unwrap_err();
        assert_eq!(err.code().as_str(), "VALIDATION");
    }

    #[test]
    fn rejects_empty_text() {
        assert!(Document::new("pubmed", "1", None, "").is_err());
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = Document::new("pubmed", "1", Some("T".into()), "body").unwrap();
        let b = Document::new("pubmed", "1", Some("T".into()), "body").unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn chunk_uuid_is_pure_function_of_parent_and_chunk_id() {
        let doc = Document::new("pubmed", "1", None, "body").unwrap();
        let a = Chunk::derive_uuid(&doc.uid, "s0");
        let b = Chunk::derive_uuid(&doc.uid, "s0");
        assert_eq!(a, b);
        let c = Chunk::derive_uuid(&doc.uid, "s1");
        assert_ne!(a, c);
    }

    #[test]
    fn chunk_id_regex_rejects_bad_ids() {
        let doc = Document::new("pubmed", "1", None, "body").unwrap();
        let result = Chunk::new(&doc, "x0".into(), 0, "text".into(), Section::Other, 10, 1, BTreeMap::new());
        assert!(result.is_err());
    }
}
