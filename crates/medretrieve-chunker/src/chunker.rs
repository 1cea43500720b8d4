//! Document -> Chunk pipeline (C2). See ARCHITECTURE §4.2.

use medretrieve_common::config::ChunkerSettings;
use medretrieve_common::{Chunk, Document, Result, Section};
use serde_json::json;
use tracing::instrument;

use crate::section::detect_sections;
use crate::sentence::split_sentences;
use crate::window::pack_windows;

/// Strips a leading title line from `text` if it case-insensitively repeats
/// the document's title (common in full-text exports that prepend the title
/// to the body). Comparison normalizes internal whitespace.
fn strip_leading_title<'a>(text: &'a str, title: Option<&str>) -> &'a str {
    let Some(title) = title else { return text };
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase();
    let title_norm = normalize(title);
    if title_norm.is_empty() {
        return text;
    }

    let trimmed = text.trim_start();
    let mut lines = trimmed.splitn(2, '\n');
    let Some(first_line) = lines.next() else { return text };
    if normalize(first_line) == title_norm {
        return lines.next().unwrap_or("").trim_start();
    }
    text
}

/// Splits `document` into an ordered sequence of Chunks.
///
/// Labelled sections (Background/Methods/Results/Conclusions/Other) are
/// windowed independently of each other and numbered densely as `s0, s1, ...`
/// across the whole document, in section-priority then discovery order.
/// A document with no recognizable headings falls back to a single
/// `Unstructured` sliding window over the whole body, numbered `w0, w1, ...`.
#[instrument(skip(document, settings), fields(uid = %document.uid))]
pub fn chunk_document(document: &Document, settings: &ChunkerSettings) -> Result<Vec<Chunk>> {
    let body = strip_leading_title(&document.text, document.title.as_deref());
    let spans = detect_sections(body);

    let is_unstructured = spans.len() == 1 && spans[0].section == Section::Unstructured;
    let prefix = if is_unstructured { "w" } else { "s" };

    let mut chunks = Vec::new();
    let mut ordinal: u32 = 0;

    for span in &spans {
        let sentences = split_sentences(&span.text);
        if sentences.is_empty() {
            continue;
        }
        let windows = pack_windows(&sentences, settings.target_tokens, settings.hard_max_tokens, settings.overlap_tokens);
        for window in windows {
            let chunk_id = format!("{prefix}{ordinal}");
            let meta = {
                let mut m = std::collections::BTreeMap::new();
                m.insert("chunker_version".to_string(), json!(settings.version));
                m
            };
            let chunk = Chunk::new(document, chunk_id, ordinal, window.text, span.section, window.tokens, window.n_sentences, meta)?;
            chunks.push(chunk);
            ordinal += 1;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, title: Option<&str>) -> Document {
        let mut d = Document::new("pubmed", "1", title.map(str::to_string), text).unwrap();
        d.title = title.map(str::to_string);
        d
    }

    #[test]
    fn labelled_abstract_yields_one_chunk_per_section_when_small() {
        let text = "Background: Short intro. Methods: We did a thing. \
                     Results: It worked. Conclusions: Good stuff.";
        let d = doc(text, None);
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].chunk_id, "s0");
        assert_eq!(chunks[0].section, Section::Background);
        assert_eq!(chunks[3].section, Section::Conclusions);
    }

    #[test]
    fn unstructured_text_uses_w_prefixed_ids() {
        let text = "Just a long running paragraph with no section headings in it at all, \
                     describing something at length so it has a few sentences to work with.";
        let d = doc(text, None);
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        assert!(chunks.iter().all(|c| c.chunk_id.starts_with('w')));
        assert!(chunks.iter().all(|c| c.section == Section::Unstructured));
    }

    #[test]
    fn chunk_ids_are_dense_and_ordered() {
        let text = "Background: First. ".repeat(5) + "Methods: " + &"Second. ".repeat(200);
        let d = doc(&text, None);
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_idx, i as u32);
            assert_eq!(c.chunk_id, format!("s{i}"));
        }
    }

    #[test]
    fn strips_leading_title_line() {
        let text = "My Great Title\nThe actual body text starts here and continues on.";
        let d = doc(text, Some("My Great Title"));
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        assert!(!chunks[0].text.contains("My Great Title"));
    }

    #[test]
    fn every_chunk_respects_the_hard_token_bound() {
        let text = "Results: ".to_string() + &"word ".repeat(5000);
        let d = doc(&text, None);
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.tokens <= settings.hard_max_tokens);
        }
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        // Document::new rejects empty text outright; use whitespace-only body instead.
        let d = doc("   ", None);
        let settings = ChunkerSettings::default();
        let chunks = chunk_document(&d, &settings).unwrap();
        assert!(chunks.is_empty());
    }
}
