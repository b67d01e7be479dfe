//! Fuzzy similarity between two section texts.
//!
//! The score is the matching-characters ratio `2·M / (|a| + |b|)` where `M`
//! is the number of characters shared by the minimal character-level diff of
//! the trimmed inputs. Identical texts score `1.0`, disjoint texts `0.0`.

use similar::TextDiff;

use crate::error::PipelineError;

/// Ratio at or above which two sections count as unchanged.
///
/// Tuned for near-duplicate paragraph detection: rewording a source name or
/// a single figure in a short item drops the score just below it.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.92;

/// Similarity ratio in `[0, 1]` between the trimmed inputs.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a == b {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Whether `a` and `b` score at least `threshold`.
pub fn similar(a: &str, b: &str, threshold: f64) -> bool {
    ratio(a, b) >= threshold
}

/// Threshold-carrying comparer used by the report differ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityComparer {
    threshold: f64,
}

impl Default for SimilarityComparer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl SimilarityComparer {
    /// Create a comparer, rejecting thresholds outside `[0, 1]`.
    pub fn new(threshold: f64) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn ratio(&self, a: &str, b: &str) -> f64 {
        ratio(a, b)
    }

    pub fn is_similar(&self, a: &str, b: &str) -> bool {
        similar(a, b, self.threshold)
    }
}
