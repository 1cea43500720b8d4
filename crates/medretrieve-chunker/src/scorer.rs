//! Document quality scoring (C3). See ARCHITECTURE §4.3.
//!
//! Grounded on the teacher's `ferrumyx-ranker/scorer.rs` weighted-sum-then-
//! clip pattern, re-targeted at the signals available on a normalized
//! Document: `detail.publication_types`, `detail.mesh_terms`, `published_at`.

use chrono::Utc;
use medretrieve_common::Document;

const PUBLICATION_TYPE_WEIGHT: f64 = 0.5;
const RECENCY_WEIGHT: f64 = 0.3;
const MESH_WEIGHT: f64 = 0.2;
const RECENCY_HALF_LIFE_YEARS: f64 = 10.0;

/// Clinical terms that earn a MeSH-term bonus; a seed dictionary (spec §9
/// Open Question: "clinical-term dictionary" — decided here, see DESIGN.md).
const CLINICAL_TERMS: &[&str] = &[
    "randomized controlled trial",
    "double-blind method",
    "treatment outcome",
    "clinical trials as topic",
    "evidence-based medicine",
    "meta-analysis as topic",
];

/// Ordered worst-to-best; used both for the quality score and for tagging
/// a document's evidence level in search results (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EvidenceLevel {
    CaseReport,
    Observational,
    ClinicalTrial,
    SystematicReview,
    MetaAnalysis,
}

impl EvidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceLevel::CaseReport => "case_report",
            EvidenceLevel::Observational => "observational",
            EvidenceLevel::ClinicalTrial => "clinical_trial",
            EvidenceLevel::SystematicReview => "systematic_review",
            EvidenceLevel::MetaAnalysis => "meta_analysis",
        }
    }

    fn weight(&self) -> f64 {
        match self {
            EvidenceLevel::CaseReport => 0.3,
            EvidenceLevel::Observational => 0.5,
            EvidenceLevel::ClinicalTrial => 0.85,
            EvidenceLevel::SystematicReview => 0.95,
            EvidenceLevel::MetaAnalysis => 1.0,
        }
    }
}

fn publication_types(doc: &Document) -> Vec<String> {
    doc.detail
        .get("publication_types")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_ascii_lowercase)).collect())
        .unwrap_or_default()
}

fn mesh_terms(doc: &Document) -> Vec<String> {
    doc.detail
        .get("mesh_terms")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_ascii_lowercase)).collect())
        .unwrap_or_default()
}

/// Derives the coarse evidence level implied by a document's publication types.
pub fn evidence_level(doc: &Document) -> EvidenceLevel {
    let types = publication_types(doc);
    let has = |needle: &str| types.iter().any(|t| t.contains(needle));

    if has("meta-analysis") {
        EvidenceLevel::MetaAnalysis
    } else if has("systematic review") {
        EvidenceLevel::SystematicReview
    } else if has("randomized controlled trial") || has("clinical trial") {
        EvidenceLevel::ClinicalTrial
    } else if has("case reports") {
        EvidenceLevel::CaseReport
    } else {
        EvidenceLevel::Observational
    }
}

fn recency_score(doc: &Document) -> f64 {
    let Some(published_at) = doc.published_at else { return 0.0 };
    let age_years = (Utc::now() - published_at).num_days() as f64 / 365.25;
    (1.0 - (age_years.max(0.0) / RECENCY_HALF_LIFE_YEARS)).clamp(0.0, 1.0)
}

fn mesh_bonus(doc: &Document) -> f64 {
    let terms = mesh_terms(doc);
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| CLINICAL_TERMS.iter().any(|c| t.contains(c))).count();
    (hits as f64 / CLINICAL_TERMS.len() as f64).min(1.0)
}

/// Counts how many entries of the clinical-term dictionary appear in `text`
/// (case-insensitive substring match). Shared by the quality scorer's MeSH
/// bonus and the retrieval engine's clinical boost (spec §4.6 step 5) so both
/// draw from the same dictionary.
pub fn count_clinical_term_matches(text: &str) -> usize {
    let lower = text.to_ascii_lowercase();
    CLINICAL_TERMS.iter().filter(|t| lower.contains(*t)).count()
}

pub fn contains_clinical_term(text: &str) -> bool {
    count_clinical_term_matches(text) > 0
}

/// A pluggable document quality scorer; the PubMed-flavored implementation is
/// the only one shipped here, consistent with spec §1 scoping PubMed-style
/// metadata as the in-scope source.
pub trait QualityScorer: Send + Sync {
    fn score(&self, doc: &Document) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PubmedQualityScorer;

impl QualityScorer for PubmedQualityScorer {
    fn score(&self, doc: &Document) -> f64 {
        let pub_type_component = evidence_level(doc).weight();
        let recency_component = recency_score(doc);
        let mesh_component = mesh_bonus(doc);

        let composite =
            PUBLICATION_TYPE_WEIGHT * pub_type_component + RECENCY_WEIGHT * recency_component + MESH_WEIGHT * mesh_component;

        composite.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn doc_with(publication_types: &[&str], mesh_terms: &[&str], years_old: i64) -> Document {
        let mut d = Document::new("pubmed", "1", None, "text").unwrap();
        d.detail.insert("publication_types".into(), json!(publication_types));
        d.detail.insert("mesh_terms".into(), json!(mesh_terms));
        d.published_at = Some(Utc::now() - Duration::days(years_old * 365));
        d
    }

    #[test]
    fn meta_analysis_scores_higher_than_case_report() {
        let meta = doc_with(&["Meta-Analysis"], &[], 1);
        let case = doc_with(&["Case Reports"], &[], 1);
        let scorer = PubmedQualityScorer;
        assert!(scorer.score(&meta) > scorer.score(&case));
    }

    #[test]
    fn older_documents_score_lower_all_else_equal() {
        let recent = doc_with(&["Randomized Controlled Trial"], &[], 1);
        let old = doc_with(&["Randomized Controlled Trial"], &[], 15);
        let scorer = PubmedQualityScorer;
        assert!(scorer.score(&recent) > scorer.score(&old));
    }

    #[test]
    fn score_is_always_clamped_to_unit_interval() {
        let d = doc_with(&["Meta-Analysis"], &["Randomized Controlled Trial", "Double-Blind Method"], 0);
        let scorer = PubmedQualityScorer;
        let s = scorer.score(&d);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn missing_metadata_yields_low_but_valid_score() {
        let d = Document::new("pubmed", "1", None, "text").unwrap();
        let scorer = PubmedQualityScorer;
        let s = scorer.score(&d);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn evidence_level_prefers_strongest_match() {
        let d = doc_with(&["Randomized Controlled Trial", "Meta-Analysis"], &[], 1);
        assert_eq!(evidence_level(&d), EvidenceLevel::MetaAnalysis);
    }

    #[test]
    fn counts_clinical_term_matches_case_insensitively() {
        let matches = count_clinical_term_matches("A Randomized Controlled Trial assessing Treatment Outcome.");
        assert_eq!(matches, 2);
        assert!(contains_clinical_term("double-blind method study"));
        assert!(!contains_clinical_term("a mouse model of disease"));
    }
}
