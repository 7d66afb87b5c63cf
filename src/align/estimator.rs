//! Time-shift estimation from match candidates.
//!
//! 1. Each diff is weighted by the square of its match percentage.
//! 2. Weighted diffs are sorted by magnitude (stable) and accumulated into a
//!    running mean; the first diff further than the outlier bound from the
//!    mean ends accumulation and everything after it is discarded.
//! 3. Lines matched more than once keep only the inlier closest to the
//!    inlier mean (the earliest one on ties).
//! 4. The shift is the floor of the mean of the remaining per-line diffs.

use crate::align::aligner::MatchCandidate;
use crate::defaults;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of a successful estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub shift_ms: i64,
    /// Candidates considered.
    pub candidates: usize,
    /// Diffs accepted by the running-mean filter.
    pub inliers: usize,
    /// Subtitle lines contributing to the final mean.
    pub lines: usize,
}

#[derive(Debug, Clone, Copy)]
struct WeightedDiff {
    line: u32,
    value: f64,
}

/// Outlier-resistant shift estimator.
#[derive(Debug, Clone, Copy)]
pub struct ShiftEstimator {
    outlier_bound_ms: f64,
}

impl Default for ShiftEstimator {
    fn default() -> Self {
        Self {
            outlier_bound_ms: defaults::OUTLIER_BOUND_MS,
        }
    }
}

impl ShiftEstimator {
    pub fn with_outlier_bound_ms(mut self, bound: f64) -> Self {
        self.outlier_bound_ms = bound;
        self
    }

    /// Estimates one shift, or `None` without candidates.
    pub fn estimate(&self, candidates: &[MatchCandidate]) -> Option<Estimate> {
        let mut diffs: Vec<WeightedDiff> = candidates
            .iter()
            .map(|c| WeightedDiff {
                line: c.line.number,
                value: c.diff_ms as f64 * c.match_percentage * c.match_percentage,
            })
            .collect();
        diffs.sort_by(|a, b| a.value.abs().total_cmp(&b.value.abs()));

        let inliers = self.running_mean_inliers(&diffs);
        if inliers.is_empty() {
            return None;
        }
        let inlier_mean = mean(inliers.iter().map(|d| d.value));

        // Per line, the inlier closest to the inlier mean
        let mut per_line: BTreeMap<u32, f64> = BTreeMap::new();
        for diff in inliers {
            per_line
                .entry(diff.line)
                .and_modify(|kept| {
                    if (diff.value - inlier_mean).abs() < (*kept - inlier_mean).abs() {
                        *kept = diff.value;
                    }
                })
                .or_insert(diff.value);
        }

        let shift = mean(per_line.values().copied()).floor() as i64;
        tracing::debug!(
            candidates = candidates.len(),
            inliers = inliers.len(),
            lines = per_line.len(),
            inlier_mean,
            shift,
            "shift estimated"
        );

        Some(Estimate {
            shift_ms: shift,
            candidates: candidates.len(),
            inliers: inliers.len(),
            lines: per_line.len(),
        })
    }

    /// Longest prefix of `sorted` that stays within the bound of its running mean.
    fn running_mean_inliers<'a>(&self, sorted: &'a [WeightedDiff]) -> &'a [WeightedDiff] {
        let mut sum = 0.0;
        for (count, diff) in sorted.iter().enumerate() {
            if count > 0 {
                let running_mean = sum / count as f64;
                if (diff.value - running_mean).abs() > self.outlier_bound_ms {
                    tracing::debug!(
                        kept = count,
                        discarded = sorted.len() - count,
                        "outliers discarded"
                    );
                    return &sorted[..count];
                }
            }
            sum += diff.value;
        }
        sorted
    }
}

/// Estimates the shift with the default outlier bound.
pub fn estimate_shift(candidates: &[MatchCandidate]) -> Option<Estimate> {
    ShiftEstimator::default().estimate(candidates)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
