use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{BackendType, GnnModelConfig, InputFormat};
use crate::error::InferenceResult;
use crate::ml::http::HttpPredictor;
use crate::ml::local::LocalPredictor;

/// Encoded graph sent to a model backend
#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub model_name: String,
    /// Graph envelope in `input_format`
    pub input: Vec<u8>,
    pub input_format: InputFormat,
    /// Content digest of the source graph, used for correlation
    pub input_digest: String,
}

/// Named raw output tensors
#[derive(Debug, Clone, Default)]
pub struct PredictResponse {
    pub outputs: HashMap<String, Vec<u8>>,
    /// Time spent in the backend as it reports it
    pub inference_time_ms: i64,
}

/// Model serving backend
///
/// Transient failures are reported as `ServingUnavailable` or
/// `InferenceTimeout`; everything else is treated as fatal by the caller.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, request: &PredictRequest) -> InferenceResult<PredictResponse>;

    /// Cheap readiness probe used while loading
    async fn health_check(&self) -> InferenceResult<()>;

    /// Release backend resources
    async fn close(&self) -> InferenceResult<()>;
}

/// Build the configured backend once at startup
pub fn build_predictor(config: &GnnModelConfig) -> InferenceResult<Arc<dyn Predictor>> {
    match config.backend {
        BackendType::Local => Ok(Arc::new(LocalPredictor::from_config(config))),
        BackendType::Http => Ok(Arc::new(HttpPredictor::new(config)?)),
    }
}
