//! Dense vector normalization and cosine similarity

use crate::error::{InferenceError, InferenceResult};
use crate::types::EmbeddingResult;

/// Norms below this are treated as zero
pub const MIN_NORM: f64 = 1e-12;

/// L2-normalize `raw`, checking its length against `expected_dim` when non-zero.
///
/// The norm is accumulated in f64. The input is left untouched.
pub fn normalize(raw: &[f32], expected_dim: usize) -> InferenceResult<EmbeddingResult> {
    if raw.is_empty() {
        return Err(InferenceError::InvalidInput("embedding vector is empty".to_string()));
    }
    if expected_dim > 0 && raw.len() != expected_dim {
        return Err(InferenceError::DimensionMismatch {
            expected: expected_dim,
            actual: raw.len(),
        });
    }

    let norm = raw.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(InferenceError::ZeroVector { norm });
    }

    let normalized_vector = raw.iter().map(|&x| (f64::from(x) / norm) as f32).collect();
    Ok(EmbeddingResult {
        normalized_vector,
        l2_norm: norm,
    })
}

/// Cosine similarity in one pass, clamped to [-1, 1]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> InferenceResult<f64> {
    if a.len() != b.len() {
        return Err(InferenceError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if a.is_empty() {
        return Err(InferenceError::InvalidInput("cannot compare empty vectors".to_string()));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a < MIN_NORM * MIN_NORM || norm_b < MIN_NORM * MIN_NORM {
        return Err(InferenceError::ZeroNorm);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}
