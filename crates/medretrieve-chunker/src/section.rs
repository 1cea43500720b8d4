//! Labelled-section detection for biomedical abstracts and full text.
//! See ARCHITECTURE §4.2 step 1.

use lazy_static::lazy_static;
use medretrieve_common::Section;
use regex::Regex;

lazy_static! {
    /// Matches a heading token at the start of a line or sentence, e.g.
    /// "BACKGROUND:", "Materials and Methods:", "Discussion." (colon or
    /// period terminator, case-insensitive).
    static ref HEADING_RE: Regex = Regex::new(
        r"(?im)^\s*(BACKGROUND|OBJECTIVES?|AIMS?|INTRODUCTION|(?:MATERIALS AND )?METHODS|RESULTS|FINDINGS|CONCLUSIONS?|DISCUSSION)\s*[:.]\s*"
    ).unwrap();
}

/// Maps a recognized heading token onto the canonical section set.
fn canonicalize(token: &str) -> Section {
    match token.to_ascii_uppercase().as_str() {
        "BACKGROUND" | "OBJECTIVE" | "OBJECTIVES" | "AIM" | "AIMS" | "INTRODUCTION" => Section::Background,
        "METHODS" | "MATERIALS AND METHODS" => Section::Methods,
        "RESULTS" | "FINDINGS" => Section::Results,
        "CONCLUSION" | "CONCLUSIONS" | "DISCUSSION" => Section::Conclusions,
        _ => Section::Other,
    }
}

/// A labelled run of text within a document, already stripped of its heading.
pub struct SectionSpan {
    pub section: Section,
    pub text: String,
}

/// Splits `text` into labelled section spans. If no recognizable heading is
/// found anywhere in the document, returns a single `Unstructured` span
/// covering the whole text (the chunker then falls back to a plain sliding
/// window over it).
pub fn detect_sections(text: &str) -> Vec<SectionSpan> {
    let matches: Vec<_> = HEADING_RE.captures_iter(text).collect();
    if matches.is_empty() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![SectionSpan { section: Section::Unstructured, text: trimmed.to_string() }];
    }

    let mut spans = Vec::new();
    for (i, cap) in matches.iter().enumerate() {
        let whole = cap.get(0).unwrap();
        let token = cap.get(1).unwrap().as_str();
        let body_start = whole.end();
        let body_end = if i + 1 < matches.len() {
            matches[i + 1].get(0).unwrap().start()
        } else {
            text.len()
        };
        let body = text[body_start..body_end].trim();
        if body.is_empty() {
            continue;
        }
        spans.push(SectionSpan { section: canonicalize(token), text: body.to_string() });
    }

    // Text preceding the first heading, if non-trivial, is unlabelled lead-in.
    if let Some(first) = matches.first() {
        let lead = text[..first.get(0).unwrap().start()].trim();
        if !lead.is_empty() {
            spans.insert(0, SectionSpan { section: Section::Other, text: lead.to_string() });
        }
    }

    if spans.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            spans.push(SectionSpan { section: Section::Unstructured, text: trimmed.to_string() });
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_labelled_abstract_sections() {
        let text = "Background: Disease X is common. \
                     Methods: We surveyed patients. \
                     Results: Most improved. \
                     Conclusions: Treatment works.";
        let spans = detect_sections(text);
        let sections: Vec<_> = spans.iter().map(|s| s.section).collect();
        assert_eq!(sections, vec![Section::Background, Section::Methods, Section::Results, Section::Conclusions]);
    }

    #[test]
    fn introduction_and_discussion_map_to_canonical_synonyms() {
        let text = "Introduction: Setting the stage. Discussion: What it means.";
        let spans = detect_sections(text);
        assert_eq!(spans[0].section, Section::Background);
        assert_eq!(spans[1].section, Section::Conclusions);
    }

    #[test]
    fn unlabelled_text_falls_back_to_unstructured() {
        let spans = detect_sections("Just a plain paragraph with no headings at all.");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].section, Section::Unstructured);
    }

    #[test]
    fn empty_text_yields_no_spans() {
        assert!(detect_sections("").is_empty());
        assert!(detect_sections("   ").is_empty());
    }
}
