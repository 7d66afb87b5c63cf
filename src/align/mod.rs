//! Alignment of recognized speech against subtitle lines.

pub mod aligner;
pub mod estimator;
pub mod matcher;

pub use aligner::{MatchCandidate, MatchConfig, align_hypothesis};
pub use estimator::{Estimate, ShiftEstimator, estimate_shift};
pub use matcher::{SentenceMatch, best_sentence_match, damerau_levenshtein, split_words};
