//! Lexical query tokenization shared by the search and similar-to paths.

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "to", "and", "or", "is", "are", "was", "were", "for", "with", "by", "at", "from", "as", "be",
    "this", "that", "it", "we", "our",
];

/// Lowercases, strips punctuation, and drops stopwords and 1-character
/// tokens, yielding the terms used by the lexical candidate search.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stopwords_and_punctuation() {
        let terms = tokenize("The effect of KRAS G12D on pancreatic cancer.");
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"of".to_string()));
        assert!(terms.contains(&"kras".to_string()));
        assert!(terms.contains(&"pancreatic".to_string()));
    }

    #[test]
    fn empty_text_yields_no_terms() {
        assert!(tokenize("").is_empty());
    }
}
