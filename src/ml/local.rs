use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::chem::encoder::{EDGE_FEATURE_DIM, GLOBAL_FEATURE_DIM, NODE_FEATURE_DIM};
use crate::config::GnnModelConfig;
use crate::error::{InferenceError, InferenceResult};
use crate::ml::codec::{decode_graph, encode_embedding, EMBEDDING_OUTPUT};
use crate::ml::predictor::{PredictRequest, PredictResponse, Predictor};
use crate::types::MolecularGraph;

/// Width of the pooled graph descriptor
pub const POOLED_DIM: usize = NODE_FEATURE_DIM + EDGE_FEATURE_DIM + GLOBAL_FEATURE_DIM;

/// Deterministic in-process backend
/// Mean-pools node and edge features, appends globals and projects the result
/// through a seeded random matrix into `embedding_dim` dimensions
pub struct LocalPredictor {
    model_name: String,
    embedding_dim: usize,
    /// Row-major `POOLED_DIM x embedding_dim`
    projection: Vec<f32>,
}

impl LocalPredictor {
    /// Create a new LocalPredictor with a projection seeded by `seed`
    pub fn new(model_name: impl Into<String>, embedding_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (POOLED_DIM as f32).sqrt();
        let projection = (0..POOLED_DIM * embedding_dim)
            .map(|_| rng.gen_range(-1.0f32..1.0) * scale)
            .collect();

        Self {
            model_name: model_name.into(),
            embedding_dim,
            projection,
        }
    }

    pub fn from_config(config: &GnnModelConfig) -> Self {
        Self::new(config.model_name.clone(), config.embedding_dim, config.projection_seed)
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Mean node features, mean edge features and globals, concatenated
    pub fn pool(graph: &MolecularGraph) -> Vec<f32> {
        let mut pooled = vec![0.0f32; POOLED_DIM];
        mean_into(&mut pooled[..NODE_FEATURE_DIM], &graph.node_features);
        mean_into(
            &mut pooled[NODE_FEATURE_DIM..NODE_FEATURE_DIM + EDGE_FEATURE_DIM],
            &graph.edge_features,
        );
        for (slot, value) in pooled[NODE_FEATURE_DIM + EDGE_FEATURE_DIM..]
            .iter_mut()
            .zip(&graph.global_features)
        {
            *slot = *value;
        }
        pooled
    }

    /// Project a pooled descriptor into embedding space
    pub fn embed_graph(&self, graph: &MolecularGraph) -> Vec<f32> {
        let pooled = Self::pool(graph);
        let mut embedding = vec![0.0f32; self.embedding_dim];
        for (row, &x) in pooled.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let weights = &self.projection[row * self.embedding_dim..(row + 1) * self.embedding_dim];
            for (out, w) in embedding.iter_mut().zip(weights) {
                *out += x * w;
            }
        }
        embedding.iter_mut().for_each(|v| *v = v.tanh());
        embedding
    }
}

fn mean_into(out: &mut [f32], rows: &[Vec<f32>]) {
    if rows.is_empty() {
        return;
    }
    for row in rows {
        for (slot, value) in out.iter_mut().zip(row) {
            *slot += value;
        }
    }
    let n = rows.len() as f32;
    out.iter_mut().for_each(|v| *v /= n);
}

#[async_trait]
impl Predictor for LocalPredictor {
    #[instrument(skip(self, request), fields(model = %request.model_name, digest = %request.input_digest))]
    async fn predict(&self, request: &PredictRequest) -> InferenceResult<PredictResponse> {
        if request.model_name != self.model_name {
            return Err(InferenceError::Backend(format!(
                "model '{}' is not served here (serving '{}')",
                request.model_name, self.model_name
            )));
        }

        let start = Instant::now();
        let graph = decode_graph(&request.input, request.input_format)
            .map_err(|e| InferenceError::Backend(format!("rejected input envelope: {}", e)))?;
        let embedding = self.embed_graph(&graph);

        debug!("Generated embedding with {} dimensions", embedding.len());

        let mut outputs = HashMap::new();
        outputs.insert(EMBEDDING_OUTPUT.to_string(), encode_embedding(&embedding));
        Ok(PredictResponse {
            outputs,
            inference_time_ms: start.elapsed().as_millis() as i64,
        })
    }

    async fn health_check(&self) -> InferenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> InferenceResult<()> {
        debug!("Local predictor closed");
        Ok(())
    }
}
