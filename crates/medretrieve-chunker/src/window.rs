//! Greedy token-window packing with overlap.
//! See ARCHITECTURE §4.2 steps 3-4, grounded on the teacher's
//! `ferrumyx-ingestion/chunker.rs` sliding-window estimator, re-targeted at
//! this project's 300/450/50 token parameters.

/// `ceil(words / 0.75)`, the teacher's cheap token estimator.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;
    (words / 0.75).ceil() as u32
}

/// One packed window, before it becomes a Chunk.
pub struct Window {
    pub text: String,
    pub tokens: u32,
    pub n_sentences: u32,
}

/// Packs `sentences` into windows targeting `target` tokens, never exceeding
/// `hard_max` except for a single sentence that alone exceeds it (split by
/// words as a last resort so every window still respects the hard bound).
/// Consecutive windows share up to `overlap` tokens of trailing context.
pub fn pack_windows(sentences: &[String], target: u32, hard_max: u32, overlap: u32) -> Vec<Window> {
    // Expand any sentence that alone exceeds hard_max into hard_max-sized
    // word slices so the packer never has to emit an over-budget window.
    let mut atoms: Vec<String> = Vec::new();
    for s in sentences {
        if estimate_tokens(s) <= hard_max {
            atoms.push(s.clone());
        } else {
            atoms.extend(split_oversized_sentence(s, hard_max));
        }
    }

    if atoms.is_empty() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut carry: Vec<String> = Vec::new();
    let mut i = 0;
    let n = atoms.len();

    while i < n {
        let mut current: Vec<String> = carry.clone();
        let mut tokens: u32 = current.iter().map(|s| estimate_tokens(s)).sum();

        while i < n {
            let candidate_tokens = estimate_tokens(&atoms[i]);
            if !current.is_empty() && tokens + candidate_tokens > hard_max {
                break;
            }
            current.push(atoms[i].clone());
            tokens += candidate_tokens;
            i += 1;
            if tokens >= target {
                break;
            }
        }

        let n_sentences = current.len() as u32;
        let text = current.join(" ");
        windows.push(Window { text, tokens, n_sentences });

        carry = trailing_overlap(&current, overlap);
    }

    merge_trailing_runt(&mut windows);
    windows
}

/// Builds the tail of `current` whose cumulative tokens stay within `overlap`.
fn trailing_overlap(current: &[String], overlap: u32) -> Vec<String> {
    let mut carry = Vec::new();
    let mut acc = 0u32;
    for s in current.iter().rev() {
        let t = estimate_tokens(s);
        if acc + t > overlap {
            break;
        }
        acc += t;
        carry.insert(0, s.clone());
    }
    carry
}

/// If the last window is too small to stand alone (< 10 tokens, the spec's
/// floor), fold it into the previous window rather than emitting a runt.
fn merge_trailing_runt(windows: &mut Vec<Window>) {
    const MIN_TOKENS: u32 = 10;
    if windows.len() < 2 {
        return;
    }
    let last = windows.last().unwrap();
    if last.tokens >= MIN_TOKENS {
        return;
    }
    let runt = windows.pop().unwrap();
    let prev = windows.last_mut().unwrap();
    prev.text = format!("{} {}", prev.text, runt.text);
    prev.tokens += runt.tokens;
    prev.n_sentences += runt.n_sentences;
}

/// Splits a single sentence that alone exceeds `hard_max` tokens into
/// contiguous word slices, each within budget. Last resort only.
fn split_oversized_sentence(sentence: &str, hard_max: u32) -> Vec<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    // Inverse of estimate_tokens: words_per_slice ~= hard_max * 0.75.
    let words_per_slice = ((hard_max as f64) * 0.75).floor().max(1.0) as usize;
    words.chunks(words_per_slice).map(|chunk| chunk.join(" ")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_matches_formula() {
        assert_eq!(estimate_tokens("one two three"), 4); // ceil(3 / 0.75) = 4
    }

    #[test]
    fn packs_short_sentences_into_single_window() {
        let sentences = vec!["A short sentence.".to_string(), "Another one.".to_string()];
        let windows = pack_windows(&sentences, 300, 450, 50);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].n_sentences, 2);
    }

    #[test]
    fn windows_never_exceed_hard_max() {
        let long_sentence = "word ".repeat(1000);
        let sentences = vec![long_sentence];
        let windows = pack_windows(&sentences, 300, 450, 50);
        assert!(windows.len() > 1);
        for w in &windows {
            assert!(w.tokens <= 450, "window exceeded hard_max: {}", w.tokens);
        }
    }

    #[test]
    fn consecutive_windows_share_overlap() {
        let sentences: Vec<String> = (0..40).map(|i| format!("Sentence number {i} with several words in it.")).collect();
        let windows = pack_windows(&sentences, 50, 80, 20);
        assert!(windows.len() >= 2);
    }

    #[test]
    fn empty_input_yields_no_windows() {
        assert!(pack_windows(&[], 300, 450, 50).is_empty());
    }
}
