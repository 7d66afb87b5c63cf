//! Matches hypotheses against subtitle lines and emits timing candidates.

use crate::align::matcher::{best_sentence_match, split_words};
use crate::defaults;
use crate::pipeline::types::Hypothesis;
use crate::subtitle::SubtitleLine;
use serde::Serialize;

/// Matching thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// A match must score strictly above this, in `(0, 1]`.
    pub threshold: f64,
    /// Minimum words on both sides, at least 1.
    pub min_word_match_count: usize,
    /// Leading words of the longer side that may be skipped; `None` is unbounded.
    pub max_word_shift: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::MATCH_THRESHOLD,
            min_word_match_count: defaults::MIN_WORD_MATCH_COUNT,
            max_word_shift: Some(defaults::MAX_WORD_SHIFT),
        }
    }
}

/// A subtitle line matched by part of a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub line: SubtitleLine,
    pub hypothesis: Hypothesis,
    pub match_percentage: f64,
    /// Absolute start of the first matched word.
    pub hyp_start_ms: u64,
    /// Absolute end of the last matched word.
    pub hyp_end_ms: u64,
    /// `hyp_start_ms - line.start_ms`
    pub diff_ms: i64,
}

/// Hypothesis words flattened into matcher tokens.
///
/// A recognized word may split into several tokens (`"well-known"`); each
/// token remembers the word it came from so spans map back to timings.
struct TokenizedHypothesis {
    tokens: Vec<String>,
    owners: Vec<usize>,
}

impl TokenizedHypothesis {
    fn new(hypothesis: &Hypothesis) -> Self {
        let mut tokens = Vec::new();
        let mut owners = Vec::new();
        for (index, word) in hypothesis.words.iter().enumerate() {
            for token in split_words(&word.word) {
                tokens.push(token);
                owners.push(index);
            }
        }
        Self { tokens, owners }
    }
}

/// Tests `hypothesis` against every line and returns the matches above the threshold.
pub fn align_hypothesis(
    hypothesis: &Hypothesis,
    lines: &[SubtitleLine],
    config: &MatchConfig,
) -> Vec<MatchCandidate> {
    let tokenized = TokenizedHypothesis::new(hypothesis);
    if tokenized.tokens.len() < config.min_word_match_count {
        return Vec::new();
    }

    lines
        .iter()
        .filter(|line| line.words.len() >= config.min_word_match_count)
        .filter_map(|line| {
            let found = best_sentence_match(
                &tokenized.tokens,
                &line.words,
                config.min_word_match_count,
                config.max_word_shift,
            )?;
            if found.percentage <= config.threshold {
                return None;
            }

            let (start, end) = found.hypothesis_span;
            let first = &hypothesis.words[tokenized.owners[start]];
            let last = &hypothesis.words[tokenized.owners[end - 1]];
            let hyp_start_ms = hypothesis.segment_start_ms + first.start_ms;
            let hyp_end_ms = hypothesis.segment_start_ms + last.end_ms;

            Some(MatchCandidate {
                line: line.clone(),
                hypothesis: hypothesis.clone(),
                match_percentage: found.percentage,
                hyp_start_ms,
                hyp_end_ms,
                diff_ms: hyp_start_ms as i64 - line.start_ms as i64,
            })
        })
        .collect()
}
