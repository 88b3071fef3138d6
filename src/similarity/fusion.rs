//! Weighted score fusion and threshold classification

use std::collections::HashMap;

use crate::error::{InferenceError, InferenceResult};
use crate::types::SimilarityLevel;

/// Effective weight at or below this means nothing matched
const MIN_EFFECTIVE_WEIGHT: f64 = 1e-12;

/// Default weight table: morgan 0.30, rdkit 0.20, atompair 0.15, gnn 0.35
pub fn default_fusion_weights() -> HashMap<String, f64> {
    [("morgan", 0.30), ("rdkit", 0.20), ("atompair", 0.15), ("gnn", 0.35)]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect()
}

/// Weighted mean over the signals present in both maps, clamped to [0, 1].
///
/// Weights are renormalized over the overlapping keys, so a missing signal
/// does not drag the score down.
pub fn fuse_scores(scores: &HashMap<String, f64>, weights: &HashMap<String, f64>) -> InferenceResult<f64> {
    let mut weighted = 0.0;
    let mut effective = 0.0;
    for (name, score) in scores {
        if let Some(&weight) = weights.get(name) {
            weighted += score * weight;
            effective += weight;
        }
    }

    if effective <= MIN_EFFECTIVE_WEIGHT {
        let mut names: Vec<&str> = scores.keys().map(String::as_str).collect();
        names.sort_unstable();
        return Err(InferenceError::NoMatchingWeights(names.join(",")));
    }

    Ok((weighted / effective).clamp(0.0, 1.0))
}

/// Lower bounds of each similarity level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            high: 0.85,
            medium: 0.70,
            low: 0.55,
        }
    }
}

impl SimilarityThresholds {
    /// Thresholds must be strictly decreasing inside (0, 1]
    pub fn validate(&self) -> InferenceResult<()> {
        let in_range = |t: f64| t > 0.0 && t <= 1.0;
        if !(in_range(self.high) && in_range(self.medium) && in_range(self.low)) {
            return Err(InferenceError::Config(format!(
                "Similarity thresholds must be within (0, 1]: {:?}",
                self
            )));
        }
        if !(self.high > self.medium && self.medium > self.low) {
            return Err(InferenceError::Config(format!(
                "Similarity thresholds must be strictly decreasing: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Map a score onto a level, bounds inclusive
    pub fn classify(&self, score: f64) -> SimilarityLevel {
        if score >= self.high {
            SimilarityLevel::High
        } else if score >= self.medium {
            SimilarityLevel::Medium
        } else if score >= self.low {
            SimilarityLevel::Low
        } else {
            SimilarityLevel::None
        }
    }
}
