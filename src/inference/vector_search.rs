use async_trait::async_trait;

use crate::error::InferenceResult;
use crate::types::VectorMatch;

/// Nearest-neighbor lookup over stored molecule embeddings
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `top_k` matches scoring at least `threshold`, best first
    async fn search(&self, vector: &[f32], top_k: usize, threshold: f64) -> InferenceResult<Vec<VectorMatch>>;
}
