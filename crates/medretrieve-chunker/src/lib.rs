//! medretrieve-chunker — document chunking (C2) and quality scoring (C3).

pub mod chunker;
pub mod scorer;
pub mod section;
pub mod sentence;
pub mod window;

pub use chunker::chunk_document;
pub use scorer::{contains_clinical_term, count_clinical_term_matches, evidence_level, EvidenceLevel, PubmedQualityScorer, QualityScorer};
pub use section::{detect_sections, SectionSpan};
pub use sentence::split_sentences;
pub use window::{estimate_tokens, pack_windows, Window};
