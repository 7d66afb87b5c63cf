//! Fuzzy sentence matching between recognized words and subtitle words.
//!
//! The longer word sequence is scanned with a bounded window: only the first
//! `max_word_shift + 1` start offsets are tried, and each window is at most as
//! long as the shorter sequence. Windows are compared as space-joined strings
//! using a character-level Damerau-Levenshtein distance.

use std::collections::HashMap;

/// Best window found by [`best_sentence_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentenceMatch {
    /// Similarity in `[0, 1]`; `1.0` is an exact match.
    pub percentage: f64,
    /// Matched span in the first argument (`hypothesis`), end exclusive.
    pub hypothesis_span: (usize, usize),
}

/// Splits text into lowercased words.
///
/// Words are runs of alphanumeric characters; apostrophes are kept inside a
/// word (`don't`) but trimmed from its edges. Everything else separates words.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .map(|token| token.trim_matches(|c| c == '\'' || c == '’'))
        .filter(|token| !token.is_empty())
        .map(|token| token.replace('’', "'").to_lowercase())
        .collect()
}

/// Unrestricted Damerau-Levenshtein distance over characters.
///
/// Counts insertions, deletions, substitutions and transpositions of adjacent
/// characters, allowing further edits between transposed characters.
pub fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let infinity = n + m;
    let width = m + 2;
    let mut d = vec![0usize; (n + 2) * width];
    let at = |i: usize, j: usize| i * width + j;

    d[at(0, 0)] = infinity;
    for i in 0..=n {
        d[at(i + 1, 0)] = infinity;
        d[at(i + 1, 1)] = i;
    }
    for j in 0..=m {
        d[at(0, j + 1)] = infinity;
        d[at(1, j + 1)] = j;
    }

    // Last row in which each character of `a` was seen
    let mut last_row: HashMap<char, usize> = HashMap::new();

    for i in 1..=n {
        let mut last_match_col = 0;
        for j in 1..=m {
            let i1 = last_row.get(&b[j - 1]).copied().unwrap_or(0);
            let j1 = last_match_col;
            let cost = if a[i - 1] == b[j - 1] {
                last_match_col = j;
                0
            } else {
                1
            };

            let substitution = d[at(i, j)] + cost;
            let insertion = d[at(i + 1, j)] + 1;
            let deletion = d[at(i, j + 1)] + 1;
            let transposition = d[at(i1, j1)] + (i - i1 - 1) + 1 + (j - j1 - 1);

            d[at(i + 1, j + 1)] = substitution.min(insertion).min(deletion).min(transposition);
        }
        last_row.insert(a[i - 1], i);
    }

    d[at(n + 1, m + 1)]
}

/// Similarity of two strings: `1 - distance / max(len)`, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - damerau_levenshtein(a, b) as f64 / longest as f64
}

/// Finds the best-scoring window between two word sequences.
///
/// Returns `None` when no window of at least `min_word_count` words exists
/// (either side shorter than `min_word_count`). A perfect score stops the
/// search immediately. `max_word_shift: None` tries every start offset.
pub fn best_sentence_match(
    hypothesis: &[String],
    line: &[String],
    min_word_count: usize,
    max_word_shift: Option<usize>,
) -> Option<SentenceMatch> {
    let min_word_count = min_word_count.max(1);
    if hypothesis.len() < min_word_count || line.len() < min_word_count {
        return None;
    }

    // Ties go to the subtitle line as the longer side
    let hypothesis_is_longer = hypothesis.len() > line.len();
    let (longer, shorter) = if hypothesis_is_longer {
        (hypothesis, line)
    } else {
        (line, hypothesis)
    };

    let shorter_str = shorter.join(" ");
    let start_limit = match max_word_shift {
        Some(shift) => longer.len().min(shift.saturating_add(1)),
        None => longer.len(),
    };

    let mut best: Option<SentenceMatch> = None;
    for i in 0..start_limit {
        let end_limit = (i + shorter.len()).min(longer.len());
        for j in (i + min_word_count)..=end_limit {
            let window = longer[i..j].join(" ");
            let percentage = similarity(&window, &shorter_str);

            let hypothesis_span = if hypothesis_is_longer {
                (i, j)
            } else {
                (0, hypothesis.len())
            };
            let candidate = SentenceMatch {
                percentage,
                hypothesis_span,
            };

            if percentage >= 1.0 {
                return Some(candidate);
            }
            if best.is_none_or(|b| percentage > b.percentage) {
                best = Some(candidate);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        split_words(text)
    }

    #[test]
    fn test_split_words_strips_punctuation_and_case() {
        assert_eq!(
            split_words("Hello, World! Don't  stop—now."),
            vec!["hello", "world", "don't", "stop", "now"]
        );
        assert_eq!(split_words("'quoted' ’curly’"), vec!["quoted", "curly"]);
        assert!(split_words(" ... ").is_empty());
    }

    #[test]
    fn test_distance_basics() {
        assert_eq!(damerau_levenshtein("", ""), 0);
        assert_eq!(damerau_levenshtein("abc", ""), 3);
        assert_eq!(damerau_levenshtein("", "abc"), 3);
        assert_eq!(damerau_levenshtein("kitten", "sitting"), 3);
        assert_eq!(damerau_levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_distance_counts_transposition_once() {
        assert_eq!(damerau_levenshtein("ab", "ba"), 1);
        assert_eq!(damerau_levenshtein("the cat", "teh cat"), 1);
    }

    #[test]
    fn test_distance_is_unrestricted() {
        // Optimal string alignment gives 3 here; the unrestricted variant allows
        // an insertion between transposed characters.
        assert_eq!(damerau_levenshtein("ca", "abc"), 2);
    }

    #[test]
    fn test_distance_handles_multibyte_chars() {
        assert_eq!(damerau_levenshtein("über", "uber"), 1);
    }

    #[test]
    fn test_similarity_range() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        let s = similarity("hello world", "hello word");
        assert!(s > 0.9 && s < 1.0);
    }

    #[test]
    fn test_exact_match_is_perfect() {
        let hyp = words("we have to leave right now");
        let line = words("We have to leave right now!");
        let m = best_sentence_match(&hyp, &line, 4, Some(2)).unwrap();
        assert_eq!(m.percentage, 1.0);
        assert_eq!(m.hypothesis_span, (0, 6));
    }

    #[test]
    fn test_longer_hypothesis_reports_window_span() {
        let hyp = words("okay so we have to leave right now");
        let line = words("we have to leave right now");
        let m = best_sentence_match(&hyp, &line, 4, Some(2)).unwrap();
        assert_eq!(m.percentage, 1.0);
        assert_eq!(m.hypothesis_span, (2, 8));
    }

    #[test]
    fn test_shift_limit_prevents_late_windows() {
        let hyp = words("one two three four we have to leave right now");
        let line = words("we have to leave right now");
        let bounded = best_sentence_match(&hyp, &line, 4, Some(2)).unwrap();
        assert!(bounded.percentage < 1.0);

        let unbounded = best_sentence_match(&hyp, &line, 4, None).unwrap();
        assert_eq!(unbounded.percentage, 1.0);
        assert_eq!(unbounded.hypothesis_span, (4, 10));
    }

    #[test]
    fn test_too_few_words_never_match() {
        let hyp = words("leave right now");
        let line = words("leave right now");
        assert!(best_sentence_match(&hyp, &line, 4, Some(2)).is_none());

        let hyp = words("we have to leave right now");
        let line = words("right now");
        assert!(best_sentence_match(&hyp, &line, 4, None).is_none());
    }

    #[test]
    fn test_percentage_stays_in_unit_range() {
        let cases = [
            ("a b c d", "wxyz wxyz wxyz wxyz wxyz"),
            ("the quick brown fox", "the quick brown fox jumps"),
            ("completely different words here", "nothing in common at all"),
        ];
        for (a, b) in cases {
            if let Some(m) = best_sentence_match(&words(a), &words(b), 4, Some(8)) {
                assert!((0.0..=1.0).contains(&m.percentage), "{a} / {b}: {m:?}");
            }
        }
    }

    #[test]
    fn test_near_match_scores_high() {
        let hyp = words("i don't think that's a good idea");
        let line = words("I don't think it's a good idea.");
        let m = best_sentence_match(&hyp, &line, 4, Some(8)).unwrap();
        assert!(m.percentage > 0.8, "got {}", m.percentage);
        assert!(m.percentage < 1.0);
    }
}
