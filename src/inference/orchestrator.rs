use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::chem::{morgan_fingerprint, GraphBuilder};
use crate::config::Config;
use crate::error::{InferenceError, InferenceResult};
use crate::inference::retry::{RetryExecutor, RetryPolicy};
use crate::inference::vector_search::VectorSearch;
use crate::ml::codec::{decode_embedding, encode_graph, EMBEDDING_OUTPUT};
use crate::ml::{ModelLifecycleManager, PredictRequest, PredictResponse, Predictor};
use crate::observability::{loggable_smiles, IdGenerator, InferenceEvent, MetricsRecorder, NoopMetrics, UuidIdGenerator};
use crate::similarity::Postprocessor;
use crate::types::{BatchEmbedItem, EmbedOutput, SimilarMolecule, SimilarityReport};

/// Signal name of the GNN embedding cosine
pub const GNN_SIGNAL: &str = "gnn";
/// Signal name of the Morgan fingerprint Tanimoto
pub const MORGAN_SIGNAL: &str = "morgan";

/// Drives parse, encode, predict and postprocess for every request
pub struct InferenceOrchestrator {
    config: Arc<Config>,
    builder: GraphBuilder,
    postprocessor: Postprocessor,
    predictor: Arc<dyn Predictor>,
    retry: RetryExecutor,
    lifecycle: Option<Arc<ModelLifecycleManager>>,
    vector_search: Option<Arc<dyn VectorSearch>>,
    metrics: Arc<dyn MetricsRecorder>,
    ids: Arc<dyn IdGenerator>,
}

impl InferenceOrchestrator {
    /// Create an orchestrator with no-op metrics and UUID request ids
    pub fn new(config: Arc<Config>, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            builder: GraphBuilder::from_config(&config),
            postprocessor: Postprocessor::from_config(&config),
            retry: RetryExecutor::new(RetryPolicy::from_config(&config.inference)),
            config,
            predictor,
            lifecycle: None,
            vector_search: None,
            metrics: Arc::new(NoopMetrics),
            ids: Arc::new(UuidIdGenerator),
        }
    }

    /// Gate every embedding on the model being `Ready`
    pub fn with_lifecycle(mut self, lifecycle: Arc<ModelLifecycleManager>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_vector_search(mut self, vector_search: Arc<dyn VectorSearch>) -> Self {
        self.vector_search = Some(vector_search);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn postprocessor(&self) -> &Postprocessor {
        &self.postprocessor
    }

    /// Embed one molecule
    #[instrument(skip(self, cancel, smiles), fields(smiles = %loggable_smiles(smiles)))]
    pub async fn embed(&self, cancel: &CancellationToken, smiles: &str) -> InferenceResult<EmbedOutput> {
        let start = Instant::now();
        let result = self.embed_one(cancel, smiles).await;
        self.record("embed", start, result.is_ok(), 1);
        result
    }

    /// Embed many molecules, chunk by chunk, isolating per-item failures
    #[instrument(skip(self, cancel, smiles_list), fields(batch_size = smiles_list.len()))]
    pub async fn batch_embed(&self, cancel: &CancellationToken, smiles_list: &[String]) -> Vec<BatchEmbedItem> {
        let start = Instant::now();
        let chunk_size = self.config.inference.batch_chunk_size.max(1);
        let mut items = Vec::with_capacity(smiles_list.len());

        for (chunk_index, chunk) in smiles_list.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;

            if cancel.is_cancelled() {
                warn!(remaining = smiles_list.len() - offset, "Batch cancelled between chunks");
                items.extend((offset..smiles_list.len()).map(|index| BatchEmbedItem {
                    index,
                    result: Err(InferenceError::InferenceTimeout(
                        "batch cancelled before item was embedded".to_string(),
                    )),
                }));
                break;
            }

            let results = join_all(chunk.iter().map(|smiles| self.embed_one(cancel, smiles))).await;
            items.extend(
                results
                    .into_iter()
                    .enumerate()
                    .map(|(position, result)| BatchEmbedItem {
                        index: offset + position,
                        result,
                    }),
            );
            debug!(chunk = chunk_index, size = chunk.len(), "Batch chunk embedded");
        }

        let failed = items.iter().filter(|item| item.result.is_err()).count();
        if failed > 0 {
            warn!(failed, total = items.len(), "Batch finished with failures");
        }
        self.record("batch_embed", start, failed == 0, smiles_list.len());
        items
    }

    /// Cosine similarity of two GNN embeddings, fused with the configured weights
    #[instrument(skip(self, cancel, smiles_a, smiles_b))]
    pub async fn compute_similarity(
        &self,
        cancel: &CancellationToken,
        smiles_a: &str,
        smiles_b: &str,
    ) -> InferenceResult<SimilarityReport> {
        let start = Instant::now();
        let result = self.similarity_report(cancel, smiles_a, smiles_b, false).await;
        self.record("similarity", start, result.is_ok(), 2);
        result
    }

    /// Like `compute_similarity`, also fusing the Morgan fingerprint Tanimoto
    #[instrument(skip(self, cancel, smiles_a, smiles_b))]
    pub async fn multi_signal_similarity(
        &self,
        cancel: &CancellationToken,
        smiles_a: &str,
        smiles_b: &str,
    ) -> InferenceResult<SimilarityReport> {
        let start = Instant::now();
        let result = self.similarity_report(cancel, smiles_a, smiles_b, true).await;
        self.record("multi_signal_similarity", start, result.is_ok(), 2);
        result
    }

    /// Embed the query and classify its nearest stored neighbors
    #[instrument(skip(self, cancel, smiles), fields(smiles = %loggable_smiles(smiles)))]
    pub async fn search_similar(
        &self,
        cancel: &CancellationToken,
        smiles: &str,
        top_k: usize,
        threshold: f64,
    ) -> InferenceResult<Vec<SimilarMolecule>> {
        let Some(vector_search) = self.vector_search.clone() else {
            return Err(InferenceError::VectorSearchUnavailable);
        };

        let start = Instant::now();
        let result = self.search_with(vector_search.as_ref(), cancel, smiles, top_k, threshold).await;
        self.record("search", start, result.is_ok(), 1);
        result
    }

    async fn search_with(
        &self,
        vector_search: &dyn VectorSearch,
        cancel: &CancellationToken,
        smiles: &str,
        top_k: usize,
        threshold: f64,
    ) -> InferenceResult<Vec<SimilarMolecule>> {
        let top_k = if top_k == 0 { self.config.inference.default_top_k } else { top_k };
        let threshold = if threshold <= 0.0 {
            self.config.inference.default_search_threshold
        } else {
            threshold
        };

        let query = self.embed_one(cancel, smiles).await?;
        let matches = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(InferenceError::InferenceTimeout("search cancelled".to_string()))
            }
            matches = vector_search.search(&query.embedding.normalized_vector, top_k, threshold) => matches?,
        };

        info!(top_k, threshold, matches = matches.len(), "Vector search completed");
        Ok(matches
            .into_iter()
            .map(|m| SimilarMolecule {
                level: self.postprocessor.classify(m.score),
                molecule_id: m.molecule_id,
                smiles: m.smiles,
                score: m.score,
                properties: m.properties,
            })
            .collect())
    }

    async fn similarity_report(
        &self,
        cancel: &CancellationToken,
        smiles_a: &str,
        smiles_b: &str,
        with_fingerprints: bool,
    ) -> InferenceResult<SimilarityReport> {
        let (a, b) = futures::join!(self.embed_one(cancel, smiles_a), self.embed_one(cancel, smiles_b));
        let (a, b) = (a?, b?);

        let cosine = self
            .postprocessor
            .cosine_similarity(&a.embedding.normalized_vector, &b.embedding.normalized_vector)?;

        let mut scores = HashMap::new();
        scores.insert(GNN_SIGNAL.to_string(), cosine);
        if with_fingerprints {
            scores.insert(MORGAN_SIGNAL.to_string(), self.morgan_tanimoto(smiles_a, smiles_b)?);
        }

        let (score, fused) = match self
            .postprocessor
            .fuse_scores(&scores, &self.config.similarity.fusion_weights)
        {
            Ok(score) => (score, true),
            Err(InferenceError::NoMatchingWeights(names)) => {
                debug!("No fusion weights for {}, using raw cosine", names);
                (cosine, false)
            }
            Err(e) => return Err(e),
        };

        Ok(SimilarityReport {
            score,
            level: self.postprocessor.classify(score),
            cosine,
            scores,
            fused,
        })
    }

    fn morgan_tanimoto(&self, smiles_a: &str, smiles_b: &str) -> InferenceResult<f64> {
        let radius = self.config.similarity.fingerprint_radius;
        let bits = self.config.similarity.fingerprint_bits;
        let fp_a = morgan_fingerprint(&self.builder.parse_smiles(smiles_a)?, radius, bits);
        let fp_b = morgan_fingerprint(&self.builder.parse_smiles(smiles_b)?, radius, bits);
        self.postprocessor.tanimoto_similarity(&fp_a, &fp_b)
    }

    /// Single-item pipeline without metrics
    async fn embed_one(&self, cancel: &CancellationToken, smiles: &str) -> InferenceResult<EmbedOutput> {
        let start = Instant::now();
        let request_id = self.ids.next_id();

        if smiles.trim().is_empty() {
            return Err(InferenceError::InvalidInput("SMILES must not be empty".to_string()));
        }
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.ensure_ready().await?;
        }

        let graph = self.builder.build(smiles)?;
        let model = &self.config.model;
        let request = PredictRequest {
            model_name: model.model_name.clone(),
            input: encode_graph(&graph, model.input_format)?,
            input_format: model.input_format,
            input_digest: graph.content_digest(),
        };

        let retried = self.retry.execute(cancel, || self.call_backend(&request)).await?;
        let response = retried.value;

        let raw_bytes = response.outputs.get(EMBEDDING_OUTPUT).ok_or_else(|| {
            InferenceError::InvalidOutput(format!("predictor response has no '{}' output", EMBEDDING_OUTPUT))
        })?;
        let raw = decode_embedding(raw_bytes, model.embedding_dim)?;
        let embedding = self.postprocessor.normalize(&raw)?;

        debug!(
            request_id = %request_id,
            atoms = graph.atom_count,
            attempts = retried.attempts,
            backend_ms = response.inference_time_ms,
            "Embedded molecule"
        );

        Ok(EmbedOutput {
            request_id,
            embedding,
            latency: start.elapsed(),
            backend_time_ms: response.inference_time_ms,
            attempts: retried.attempts,
        })
    }

    /// One backend call bounded by the inference timeout
    async fn call_backend(&self, request: &PredictRequest) -> InferenceResult<PredictResponse> {
        let timeout = self.config.model.inference_timeout();
        match tokio::time::timeout(timeout, self.predictor.predict(request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::InferenceTimeout(format!(
                "backend call exceeded {:?}",
                timeout
            ))),
        }
    }

    fn record(&self, task_type: &str, start: Instant, success: bool, batch_size: usize) {
        self.metrics.record_inference(&InferenceEvent {
            model: self.config.model.model_name.clone(),
            task_type: task_type.to_string(),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            success,
            batch_size,
        });
    }
}
