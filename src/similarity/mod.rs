/// Embedding postprocessing and similarity scoring
///
/// This module contains:
/// - L2 normalization and cosine similarity for dense embeddings
/// - Tanimoto similarity for packed bit fingerprints
/// - Weighted multi-signal fusion and threshold classification

pub mod fingerprint;
pub mod fusion;
pub mod vector;


use std::collections::HashMap;

pub use fingerprint::tanimoto_similarity;
pub use fusion::{default_fusion_weights, fuse_scores, SimilarityThresholds};
pub use vector::{cosine_similarity, normalize};

use crate::config::Config;
use crate::error::InferenceResult;
use crate::types::{EmbeddingResult, SimilarityLevel};

/// Stateless postprocessor bound to an embedding dimension and thresholds
#[derive(Debug, Clone)]
pub struct Postprocessor {
    expected_dim: usize,
    thresholds: SimilarityThresholds,
}

impl Postprocessor {
    /// `expected_dim` of 0 accepts any length
    pub fn new(expected_dim: usize, thresholds: SimilarityThresholds) -> Self {
        Self {
            expected_dim,
            thresholds,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.model.embedding_dim, config.similarity.thresholds())
    }

    pub fn expected_dim(&self) -> usize {
        self.expected_dim
    }

    pub fn thresholds(&self) -> &SimilarityThresholds {
        &self.thresholds
    }

    pub fn normalize(&self, raw: &[f32]) -> InferenceResult<EmbeddingResult> {
        normalize(raw, self.expected_dim)
    }

    pub fn cosine_similarity(&self, a: &[f32], b: &[f32]) -> InferenceResult<f64> {
        cosine_similarity(a, b)
    }

    pub fn tanimoto_similarity(&self, a: &[u8], b: &[u8]) -> InferenceResult<f64> {
        tanimoto_similarity(a, b)
    }

    pub fn fuse_scores(&self, scores: &HashMap<String, f64>, weights: &HashMap<String, f64>) -> InferenceResult<f64> {
        fuse_scores(scores, weights)
    }

    pub fn classify(&self, score: f64) -> SimilarityLevel {
        self.thresholds.classify(score)
    }
}

impl Default for Postprocessor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
