//! Pairwise text similarity.
//!
//! A [`Similarity`] returns a score in `[0, 1]` where 1 means identical.
//! Implementations may also report a cheap upper bound from the two text
//! lengths alone; the clustering pass skips any pair whose bound is already
//! below the threshold without running the full comparison.

use serde::{Deserialize, Serialize};

/// Default score at or above which two texts are near-duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.95;

/// A symmetric similarity measure over texts.
pub trait Similarity: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Score two texts. Must be symmetric, in `[0, 1]`, and 1 for equal
    /// inputs.
    fn score(&self, a: &str, b: &str) -> f64;

    /// Upper bound on [`Self::score`] for texts of `len_a` and `len_b`
    /// characters. The default never prunes.
    fn upper_bound(&self, _len_a: usize, _len_b: usize) -> f64 {
        1.0
    }
}

/// `1 - levenshtein(a, b) / max(|a|, |b|)` over characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn name(&self) -> &'static str {
        "levenshtein"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }

    // The edit distance is at least the length difference.
    fn upper_bound(&self, len_a: usize, len_b: usize) -> f64 {
        let longest = len_a.max(len_b);
        if longest == 0 {
            return 1.0;
        }
        len_a.min(len_b) as f64 / longest as f64
    }
}

/// Sørensen-Dice coefficient over character bigrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SorensenDice;

impl Similarity for SorensenDice {
    fn name(&self) -> &'static str {
        "sorensen_dice"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::sorensen_dice(a, b)
    }
}

/// Jaro-Winkler similarity, which favours a shared prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn name(&self) -> &'static str {
        "jaro_winkler"
    }

    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b)
    }
}

/// Selectable similarity measure.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    /// Normalized Levenshtein distance
    #[default]
    Levenshtein,
    /// Sørensen-Dice bigram overlap
    SorensenDice,
    /// Jaro-Winkler
    JaroWinkler,
}

impl SimilarityAlgorithm {
    /// Instantiate the measure.
    #[must_use]
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            Self::Levenshtein => Box::new(NormalizedLevenshtein),
            Self::SorensenDice => Box::new(SorensenDice),
            Self::JaroWinkler => Box::new(JaroWinkler),
        }
    }

    /// Stable name used in reports and config files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Levenshtein => "levenshtein",
            Self::SorensenDice => "sorensen_dice",
            Self::JaroWinkler => "jaro_winkler",
        }
    }
}

impl std::fmt::Display for SimilarityAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
