//! Bit fingerprint similarity

use crate::error::{InferenceError, InferenceResult};

/// Tanimoto (Jaccard) similarity of two packed bit fingerprints.
///
/// Two all-zero fingerprints score 0.0.
pub fn tanimoto_similarity(a: &[u8], b: &[u8]) -> InferenceResult<f64> {
    if a.len() != b.len() {
        return Err(InferenceError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if a.is_empty() {
        return Err(InferenceError::InvalidInput("cannot compare empty fingerprints".to_string()));
    }

    let (mut intersection, mut bits_a, mut bits_b) = (0u64, 0u64, 0u64);
    for (&x, &y) in a.iter().zip(b) {
        intersection += u64::from((x & y).count_ones());
        bits_a += u64::from(x.count_ones());
        bits_b += u64::from(y.count_ones());
    }

    let union = bits_a + bits_b - intersection;
    if union == 0 {
        return Ok(0.0);
    }
    Ok(intersection as f64 / union as f64)
}
