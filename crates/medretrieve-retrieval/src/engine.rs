//! Hybrid retrieval engine (C6). See ARCHITECTURE §4.6.
//!
//! Pipeline: gather lexical + vector chunk candidates (or just one branch,
//! depending on `mode`), merge into a per-chunk fused score, group by parent
//! document, reconstruct each document's best ordering of chunks, compute a
//! composite document score (fused retrieval score + chunk-count/section-
//! coverage/quality terms, plus recency and clinical boosts), cap per-journal
//! diversity once the result set is large, then apply a strict tie-break
//! before truncating to `limit`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use medretrieve_chunker::{contains_clinical_term, count_clinical_term_matches, evidence_level, PubmedQualityScorer, QualityScorer};
use medretrieve_common::config::SearchCacheSettings;
use medretrieve_common::{Chunk, Document, MedretrieveError, Result, Section};
use medretrieve_db::{DocumentRepository, VectorStore};
use medretrieve_limiter::{BreakerRegistry, CircuitBreaker};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::embedder::QueryEmbedder;
use crate::query::tokenize;

const MAX_LIMIT: usize = 50;
const MAX_QUERY_CHARS: usize = 1024;
const CORE_SECTIONS: [Section; 4] = [Section::Background, Section::Methods, Section::Results, Section::Conclusions];
const MAX_PER_JOURNAL: usize = 2;
const DIVERSITY_CAP_THRESHOLD: usize = 20;
const SNIPPET_MAX_CHUNKS: usize = 3;
const SIMILAR_TO_TRUNCATE_CHARS: usize = 1000;

/// Which branch(es) of the hybrid query to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Hybrid,
    Vector,
    Lexical,
}

impl SearchMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "hybrid" => Ok(SearchMode::Hybrid),
            "vector" => Ok(SearchMode::Vector),
            "lexical" => Ok(SearchMode::Lexical),
            other => Err(MedretrieveError::validation("mode", format!("unknown mode {other:?}, expected hybrid|vector|lexical"))),
        }
    }
}

/// Shape of the returned hits: reconstructed documents, or raw chunks ranked
/// by fused chunk score directly (no document reconstruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKind {
    #[default]
    Documents,
    Chunks,
}

impl ReturnKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "documents" => Ok(ReturnKind::Documents),
            "chunks" => Ok(ReturnKind::Chunks),
            other => Err(MedretrieveError::validation("return", format!("unknown return kind {other:?}, expected documents|chunks"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source: Option<String>,
    pub year_range: Option<(i32, i32)>,
    pub sections: Vec<Section>,
}

impl SearchFilters {
    fn as_predicate(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(source) = &self.source {
            clauses.push(format!("source = '{}'", source.replace('\'', "''")));
        }
        if let Some((lo, hi)) = self.year_range {
            clauses.push(format!("published_at >= '{lo:04}-01-01T00:00:00Z'"));
            clauses.push(format!("published_at < '{:04}-01-01T00:00:00Z'", hi + 1));
        }
        if !self.sections.is_empty() {
            let section_clause = self.sections.iter().map(|s| format!("section = '{}'", s.as_str())).collect::<Vec<_>>().join(" OR ");
            clauses.push(format!("({section_clause})"));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    fn cache_key(&self) -> String {
        let mut sections: Vec<&str> = self.sections.iter().map(Section::as_str).collect();
        sections.sort_unstable();
        format!(
            "{}|{}|{}",
            self.source.as_deref().unwrap_or(""),
            self.year_range.map(|(lo, hi)| format!("{lo}-{hi}")).unwrap_or_default(),
            sections.join(",")
        )
    }
}

/// Tuning knobs beyond `query`/`filters`/`limit`, mirroring the `search` tool
/// surface one-to-one.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub alpha: f64,
    pub quality_threshold: Option<f64>,
    pub boost_recent: bool,
    pub boost_clinical: bool,
    pub return_kind: ReturnKind,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { mode: SearchMode::Hybrid, alpha: 0.5, quality_threshold: None, boost_recent: true, boost_clinical: true, return_kind: ReturnKind::Documents }
    }
}

impl SearchOptions {
    fn cache_key(&self) -> String {
        format!(
            "{:?}|{}|{}|{}|{}|{:?}",
            self.mode,
            self.alpha,
            self.quality_threshold.unwrap_or(-1.0),
            self.boost_recent,
            self.boost_clinical,
            self.return_kind
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub uid: String,
    pub title: Option<String>,
    pub score: f64,
    pub quality_total: f64,
    pub evidence_level: String,
    pub published_at: Option<DateTime<Utc>>,
    pub journal: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub uuid: Uuid,
    pub parent_uid: String,
    pub section: String,
    pub score: f64,
    pub text: String,
}

/// Uniform result envelope for both `return` shapes; kept `Clone` so the
/// cache can store either shape under one value type.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Documents(Vec<SearchHit>),
    Chunks(Vec<ChunkHit>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconstructedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

struct Candidate {
    chunk: Chunk,
    vector_score: f64,
    lexical_score: f64,
}

impl Candidate {
    fn combined(&self, mode: SearchMode, alpha: f64) -> f64 {
        match mode {
            SearchMode::Hybrid => alpha * self.vector_score + (1.0 - alpha) * self.lexical_score,
            SearchMode::Vector => self.vector_score,
            SearchMode::Lexical => self.lexical_score,
        }
    }
}

pub struct RetrievalEngine {
    vectors: Arc<VectorStore>,
    documents: Arc<DocumentRepository>,
    scorer: Arc<dyn QualityScorer>,
    embedder: Arc<dyn QueryEmbedder>,
    cache: Mutex<TtlCache<SearchResults>>,
    vector_breaker: Arc<CircuitBreaker>,
    db_breaker: Arc<CircuitBreaker>,
}

impl RetrievalEngine {
    pub fn new(
        vectors: Arc<VectorStore>,
        documents: Arc<DocumentRepository>,
        scorer: Arc<dyn QualityScorer>,
        embedder: Arc<dyn QueryEmbedder>,
        cache_settings: &SearchCacheSettings,
        breakers: &BreakerRegistry,
    ) -> Self {
        Self {
            vectors,
            documents,
            scorer,
            embedder,
            cache: Mutex::new(TtlCache::new(cache_settings.capacity, cache_settings.ttl_seconds)),
            vector_breaker: breakers.get("vector_store"),
            db_breaker: breakers.get("relational_db"),
        }
    }

    pub fn with_defaults(vectors: Arc<VectorStore>, documents: Arc<DocumentRepository>) -> Self {
        Self::new(
            vectors,
            documents,
            Arc::new(PubmedQualityScorer),
            Arc::new(crate::embedder::NullEmbedder),
            &SearchCacheSettings::default(),
            &BreakerRegistry::new(medretrieve_common::config::BreakerSettings::default()),
        )
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.lock().unwrap().stats()
    }

    #[instrument(skip(self, options))]
    pub async fn search(&self, query: &str, filters: SearchFilters, limit: usize, options: &SearchOptions) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MedretrieveError::validation("query", "must be non-empty"));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(MedretrieveError::validation("query", format!("must be at most {MAX_QUERY_CHARS} characters")));
        }
        let alpha = options.alpha.clamp(0.0, 1.0);
        let limit = limit.clamp(1, MAX_LIMIT);
        let options = SearchOptions { alpha, ..options.clone() };

        let cache_key = format!("{}::{}::{}::{}", query, filters.cache_key(), limit, options.cache_key());
        if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
            return Ok(cached);
        }

        let results = self.search_uncached(query, &filters, limit, &options).await?;
        self.cache.lock().unwrap().put(cache_key, results.clone());
        Ok(results)
    }

    async fn search_uncached(&self, query: &str, filters: &SearchFilters, limit: usize, options: &SearchOptions) -> Result<SearchResults> {
        let terms = tokenize(query);
        let k_prime = (limit * 3).max(30);
        let predicate = filters.as_predicate();

        let lexical_chunks = if options.mode != SearchMode::Vector {
            self.vector_breaker.guard(self.vectors.search_lexical(&terms, k_prime, predicate.as_deref())).await?
        } else {
            Vec::new()
        };

        let vector_chunks = if options.mode != SearchMode::Lexical {
            match self.embedder.embed_query(query).await? {
                Some(embedding) => self.vector_breaker.guard(self.vectors.search_vector(&embedding, k_prime, predicate.as_deref())).await?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let mut candidates: HashMap<Uuid, Candidate> = HashMap::new();

        for chunk in lexical_chunks {
            let lexical_score = lexical_overlap_score(&chunk.text, &terms);
            candidates
                .entry(chunk.uuid)
                .and_modify(|c| c.lexical_score = c.lexical_score.max(lexical_score))
                .or_insert_with(|| Candidate { chunk: chunk.clone(), vector_score: 0.0, lexical_score });
        }

        for (chunk, distance) in vector_chunks {
            let vector_score = 1.0 / (1.0 + distance as f64);
            candidates
                .entry(chunk.uuid)
                .and_modify(|c| c.vector_score = c.vector_score.max(vector_score))
                .or_insert_with(|| Candidate { chunk: chunk.clone(), vector_score, lexical_score: 0.0 });
        }

        if options.return_kind == ReturnKind::Chunks {
            return Ok(SearchResults::Chunks(self.rank_chunks(candidates, limit, options)));
        }

        self.rank_documents(candidates, query, limit, options).await.map(SearchResults::Documents)
    }

    fn rank_chunks(&self, candidates: HashMap<Uuid, Candidate>, limit: usize, options: &SearchOptions) -> Vec<ChunkHit> {
        let mut hits: Vec<ChunkHit> = candidates
            .into_values()
            .map(|c| {
                let score = c.combined(options.mode, options.alpha);
                ChunkHit { uuid: c.chunk.uuid, parent_uid: c.chunk.parent_uid.clone(), section: c.chunk.section.as_str().to_string(), score, text: c.chunk.text.clone() }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.uuid.cmp(&b.uuid)));
        hits.truncate(limit);
        hits
    }

    async fn rank_documents(&self, candidates: HashMap<Uuid, Candidate>, query: &str, limit: usize, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let mut by_document: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (_uuid, candidate) in candidates {
            by_document.entry(candidate.chunk.parent_uid.clone()).or_default().push(candidate);
        }

        let query_has_clinical_term = contains_clinical_term(query);

        let mut hits = Vec::with_capacity(by_document.len());
        for (uid, mut doc_candidates) in by_document {
            let Some(document) = self.db_breaker.guard(self.documents.find_by_uid(&uid)).await? else { continue };

            doc_candidates.sort_by(|a, b| {
                b.combined(options.mode, options.alpha).partial_cmp(&a.combined(options.mode, options.alpha)).unwrap_or(std::cmp::Ordering::Equal)
            });
            let best_chunk_score = doc_candidates.first().map(|c| c.combined(options.mode, options.alpha)).unwrap_or(0.0);
            let chunk_count = doc_candidates.len();

            let mut ordered = doc_candidates;
            ordered.sort_by_key(|c| (c.chunk.section.priority(), c.chunk.chunk_idx));
            let snippet = ordered.iter().take(SNIPPET_MAX_CHUNKS).map(|c| c.chunk.text.as_str()).collect::<Vec<_>>().join(" ");
            let sections_seen: HashSet<Section> = ordered.iter().map(|c| c.chunk.section).collect();
            let core_sections_covered = CORE_SECTIONS.iter().filter(|s| sections_seen.contains(s)).count();

            let quality_total = document.provenance.get("quality_score").and_then(|v| v.as_f64()).unwrap_or_else(|| self.scorer.score(&document));

            if let Some(threshold) = options.quality_threshold {
                if quality_total < threshold {
                    continue;
                }
            }

            let doc_score = best_chunk_score + (0.05 * chunk_count as f64).min(0.2) + 0.1 * (core_sections_covered as f64 / CORE_SECTIONS.len() as f64) + 0.05 * quality_total;

            let recency_component = if options.boost_recent { recency_boost(document.published_at) } else { 0.0 };
            let clinical_component = if options.boost_clinical {
                clinical_boost(&document.searchable_text(), query_has_clinical_term)
            } else {
                0.0
            };

            let score = doc_score + recency_component + clinical_component;
            let evidence = evidence_level(&document);
            let journal = document.detail.get("journal").and_then(|v| v.as_str()).map(str::to_string);

            hits.push(SearchHit {
                uid: document.uid.clone(),
                title: document.title.clone(),
                score,
                quality_total,
                evidence_level: evidence.as_str().to_string(),
                published_at: document.published_at,
                journal,
                snippet,
            });
        }

        apply_journal_diversity_cap(&mut hits);
        tie_break_sort(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    #[instrument(skip(self))]
    pub async fn get_by_uid(&self, uid: &str, include_chunks: bool) -> Result<Option<ReconstructedDocument>> {
        let Some(document) = self.db_breaker.guard(self.documents.find_by_uid(uid)).await? else { return Ok(None) };
        let chunks = if include_chunks {
            let mut chunks = self.vector_breaker.guard(self.vectors.find_by_parent_uid(uid)).await?;
            chunks.sort_by_key(|c| (c.section.priority(), c.chunk_idx));
            chunks
        } else {
            Vec::new()
        };
        Ok(Some(ReconstructedDocument { document, chunks }))
    }

    #[instrument(skip(self))]
    pub async fn similar_to(&self, uid: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(document) = self.db_breaker.guard(self.documents.find_by_uid(uid)).await? else {
            return Err(MedretrieveError::NotFound(format!("document {uid}")));
        };
        let referent_text = truncate_chars(&document.searchable_text(), SIMILAR_TO_TRUNCATE_CHARS);
        let filters = SearchFilters { source: Some(document.source.clone()), ..SearchFilters::default() };
        let results = self.search_uncached(&referent_text, &filters, limit + 1, &SearchOptions::default()).await?;
        let SearchResults::Documents(mut hits) = results else {
            unreachable!("default search options always request document-shaped results")
        };
        hits.retain(|h| h.uid != uid);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Drops every cached search result (cache keys embed filters inline,
    /// so there is no per-source prefix to target selectively).
    pub fn invalidate_all(&self) {
        self.cache.lock().unwrap().invalidate_prefix("");
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn lexical_overlap_score(text: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_ascii_lowercase();
    let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

/// Step-function recency boost (spec §4.6 step 5): `0.15` within 2 years,
/// `0.075` within 5, `0.03` within 10, else `0`.
fn recency_boost(published_at: Option<DateTime<Utc>>) -> f64 {
    let Some(published_at) = published_at else { return 0.0 };
    let age_years = (Utc::now() - published_at).num_days() as f64 / 365.25;
    if age_years <= 2.0 {
        0.15
    } else if age_years <= 5.0 {
        0.075
    } else if age_years <= 10.0 {
        0.03
    } else {
        0.0
    }
}

/// Counts clinical-term dictionary matches in `searchable_text` (title +
/// abstract), clamped at `min(0.10, 0.02 * matches)`; scaled by 1.5 when the
/// query itself names a clinical term.
fn clinical_boost(searchable_text: &str, query_has_clinical_term: bool) -> f64 {
    let matches = count_clinical_term_matches(searchable_text);
    let boost = (0.02 * matches as f64).min(0.10);
    if query_has_clinical_term {
        boost * 1.5
    } else {
        boost
    }
}

/// Applies the per-journal cap only once the result set is large enough for
/// diversity to matter (spec §4.6 step 7): below the threshold, a single
/// well-covered journal is allowed to dominate.
fn apply_journal_diversity_cap(hits: &mut Vec<SearchHit>) {
    if hits.len() <= DIVERSITY_CAP_THRESHOLD {
        return;
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut per_journal: HashMap<String, usize> = HashMap::new();
    hits.retain(|hit| match &hit.journal {
        Some(journal) => {
            let count = per_journal.entry(journal.clone()).or_insert(0);
            *count += 1;
            *count <= MAX_PER_JOURNAL
        }
        None => true,
    });
}

fn tie_break_sort(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.quality_total.partial_cmp(&a.quality_total).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.published_at.cmp(&a.published_at))
            .then_with(|| a.uid.cmp(&b.uid))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(uid: &str, score: f64, quality_total: f64, journal: Option<&str>, published_at: Option<DateTime<Utc>>) -> SearchHit {
        SearchHit {
            uid: uid.to_string(),
            title: None,
            score,
            quality_total,
            evidence_level: "observational".to_string(),
            published_at,
            journal: journal.map(str::to_string),
            snippet: String::new(),
        }
    }

    #[test]
    fn tie_break_orders_by_score_then_quality_then_recency_then_uid() {
        let now = Utc::now();
        let mut hits = vec![
            hit("b:2", 0.5, 0.5, None, Some(now)),
            hit("a:1", 0.5, 0.9, None, Some(now)),
            hit("c:3", 0.9, 0.1, None, Some(now)),
        ];
        tie_break_sort(&mut hits);
        assert_eq!(hits[0].uid, "c:3");
        assert_eq!(hits[1].uid, "a:1");
        assert_eq!(hits[2].uid, "b:2");
    }

    #[test]
    fn diversity_cap_is_a_no_op_below_threshold() {
        let mut hits: Vec<SearchHit> = (0..5).map(|i| hit(&format!("s:{i}"), 1.0 - i as f64 * 0.01, 0.5, Some("NEJM"), None)).collect();
        apply_journal_diversity_cap(&mut hits);
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn journal_diversity_cap_limits_same_journal_hits_once_gated() {
        let mut hits: Vec<SearchHit> = (0..25).map(|i| hit(&format!("s:{i}"), 1.0 - i as f64 * 0.001, 0.5, Some("NEJM"), None)).collect();
        apply_journal_diversity_cap(&mut hits);
        assert_eq!(hits.len(), MAX_PER_JOURNAL);
    }

    #[test]
    fn journal_diversity_cap_does_not_limit_unlabelled_hits() {
        let mut hits: Vec<SearchHit> = (0..25).map(|i| hit(&format!("s:{i}"), 1.0, 0.5, None, None)).collect();
        apply_journal_diversity_cap(&mut hits);
        assert_eq!(hits.len(), 25);
    }

    #[test]
    fn lexical_overlap_score_is_fraction_of_matched_terms() {
        let terms = vec!["kras".to_string(), "pancreatic".to_string()];
        let score = lexical_overlap_score("KRAS mutation in pancreatic tumors", &terms);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recency_boost_decays_in_steps() {
        let within_2y = recency_boost(Some(Utc::now() - chrono::Duration::days(365)));
        let within_5y = recency_boost(Some(Utc::now() - chrono::Duration::days(365 * 4)));
        let within_10y = recency_boost(Some(Utc::now() - chrono::Duration::days(365 * 8)));
        let beyond = recency_boost(Some(Utc::now() - chrono::Duration::days(365 * 15)));
        assert_eq!(within_2y, 0.15);
        assert_eq!(within_5y, 0.075);
        assert_eq!(within_10y, 0.03);
        assert_eq!(beyond, 0.0);
    }

    #[test]
    fn clinical_boost_scales_with_matches_and_query_relevance() {
        let text = "A Randomized Controlled Trial assessing Treatment Outcome.";
        let plain_query_boost = clinical_boost(text, false);
        let clinical_query_boost = clinical_boost(text, true);
        assert!((plain_query_boost - 0.04).abs() < 1e-9);
        assert!((clinical_query_boost - 0.06).abs() < 1e-9);
    }

    #[test]
    fn clinical_boost_is_clamped_at_point_one() {
        let text = "randomized controlled trial double-blind method treatment outcome clinical trials as topic evidence-based medicine meta-analysis as topic";
        let boost = clinical_boost(text, false);
        assert!((boost - 0.10).abs() < 1e-9);
    }

    #[test]
    fn similar_to_truncation_respects_char_boundaries() {
        let text = "é".repeat(2000);
        let truncated = truncate_chars(&text, SIMILAR_TO_TRUNCATE_CHARS);
        assert_eq!(truncated.chars().count(), SIMILAR_TO_TRUNCATE_CHARS);
    }

    #[test]
    fn mode_and_return_kind_parse_known_values_only() {
        assert_eq!(SearchMode::parse("lexical").unwrap(), SearchMode::Lexical);
        assert!(SearchMode::parse("bogus").is_err());
        assert_eq!(ReturnKind::parse("chunks").unwrap(), ReturnKind::Chunks);
        assert!(ReturnKind::parse("bogus").is_err());
    }
}
