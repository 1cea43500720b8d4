//! Sentence splitting that respects common biomedical abbreviations.
//! See ARCHITECTURE §4.2 step 2.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Abbreviations whose trailing period must not be read as a sentence end.
    static ref ABBREV_RE: Regex = Regex::new(
        r"(?i)\b(et al|e\.g|i\.e|approx|etc|figs?|eqs?|vs|dr|mr|mrs|ms|prof|st)\."
    ).unwrap();

    /// Sentence terminator: `.`/`!`/`?` followed by whitespace or end-of-string.
    static ref SPLIT_RE: Regex = Regex::new(r"[.!?](\s+|$)").unwrap();
}

/// Placeholder substituted for a protected abbreviation's period.
const GUARD: char = '\u{1}';

/// Split `text` into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let guarded = ABBREV_RE.replace_all(text, |caps: &regex::Captures| format!("{}{}", &caps[1], GUARD));

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SPLIT_RE.find_iter(&guarded) {
        let piece = guarded[last..m.end()].trim();
        if !piece.is_empty() {
            sentences.push(piece.to_string());
        }
        last = m.end();
    }
    if last < guarded.len() {
        let piece = guarded[last..].trim();
        if !piece.is_empty() {
            sentences.push(piece.to_string());
        }
    }

    sentences.into_iter().map(|s| s.replace(GUARD, ".")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_period_space_capital() {
        let s = split_sentences("First sentence. Second sentence. Third.");
        assert_eq!(s, vec!["First sentence.", "Second sentence.", "Third."]);
    }

    #[test]
    fn does_not_split_on_et_al() {
        let s = split_sentences("Smith et al. reported a result. It was significant.");
        assert_eq!(s.len(), 2);
        assert!(s[0].contains("et al. reported"));
    }

    #[test]
    fn does_not_split_on_eg_and_ie() {
        let s = split_sentences("We used several drugs (e.g. aspirin) i.e. common ones. This worked.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn empty_text_yields_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
