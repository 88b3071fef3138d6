use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{InferenceError, InferenceResult, ParseError};
use crate::inference::{InferenceOrchestrator, VectorSearch};
use crate::ml::{LocalPredictor, ModelLifecycleManager, ModelState, PredictRequest, PredictResponse, Predictor};
use crate::observability::{IdGenerator, InferenceEvent, MetricsRecorder, NoopMetrics};
use crate::types::{SimilarityLevel, VectorMatch};

fn test_config() -> Config {
    let mut config = Config::default();
    config.model.embedding_dim = 32;
    config.inference.retry_base_delay_ms = 1;
    config.inference.retry_max_delay_ms = 5;
    config.inference.batch_chunk_size = 2;
    config
}

/// Local backend that fails the first `failures` calls with a transient error
struct FlakyBackend {
    inner: LocalPredictor,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyBackend {
    fn new(config: &Config, failures: u32) -> Self {
        Self {
            inner: LocalPredictor::from_config(&config.model),
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Predictor for FlakyBackend {
    async fn predict(&self, request: &PredictRequest) -> InferenceResult<PredictResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(InferenceError::ServingUnavailable("warming up".to_string()));
        }
        self.inner.predict(request).await
    }

    async fn health_check(&self) -> InferenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> InferenceResult<()> {
        Ok(())
    }
}

/// Backend returning a fixed response
struct StaticBackend {
    response: PredictResponse,
}

#[async_trait]
impl Predictor for StaticBackend {
    async fn predict(&self, _request: &PredictRequest) -> InferenceResult<PredictResponse> {
        Ok(self.response.clone())
    }

    async fn health_check(&self) -> InferenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> InferenceResult<()> {
        Ok(())
    }
}

/// Backend that never answers
struct HangingBackend;

#[async_trait]
impl Predictor for HangingBackend {
    async fn predict(&self, _request: &PredictRequest) -> InferenceResult<PredictResponse> {
        std::future::pending().await
    }

    async fn health_check(&self) -> InferenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> InferenceResult<()> {
        Ok(())
    }
}

/// Local backend that tracks how many predictions run at once
struct ConcurrencyTrackingBackend {
    inner: LocalPredictor,
    in_flight: AtomicU32,
    peak: AtomicU32,
    calls: AtomicU32,
}

#[async_trait]
impl Predictor for ConcurrencyTrackingBackend {
    async fn predict(&self, request: &PredictRequest) -> InferenceResult<PredictResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.predict(request).await
    }

    async fn health_check(&self) -> InferenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> InferenceResult<()> {
        Ok(())
    }
}

/// Brute-force search over a fixed set of stored embeddings
struct InMemorySearch {
    entries: Vec<(VectorMatch, Vec<f32>)>,
    calls: Mutex<Vec<(usize, f64)>>,
}

#[async_trait]
impl VectorSearch for InMemorySearch {
    async fn search(&self, vector: &[f32], top_k: usize, threshold: f64) -> InferenceResult<Vec<VectorMatch>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((top_k, threshold));
        }
        let mut matches: Vec<VectorMatch> = self
            .entries
            .iter()
            .map(|(entry, stored)| {
                let score: f64 = stored.iter().zip(vector).map(|(a, b)| f64::from(*a) * f64::from(*b)).sum();
                VectorMatch {
                    score,
                    ..entry.clone()
                }
            })
            .filter(|m| m.score >= threshold)
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[derive(Default)]
struct RecordingMetrics {
    events: Mutex<Vec<InferenceEvent>>,
}

impl MetricsRecorder for RecordingMetrics {
    fn record_inference(&self, event: &InferenceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

struct SequentialIds(AtomicU32);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("req-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn local_orchestrator(config: Config) -> InferenceOrchestrator {
    let predictor = Arc::new(LocalPredictor::from_config(&config.model));
    InferenceOrchestrator::new(Arc::new(config), predictor)
}

#[tokio::test]
async fn test_embed_returns_unit_vector() {
    let orchestrator = local_orchestrator(test_config());
    let cancel = CancellationToken::new();

    let output = assert_ok!(orchestrator.embed(&cancel, "CCO").await);
    assert_eq!(output.embedding.normalized_vector.len(), 32);
    let norm: f64 = output
        .embedding
        .normalized_vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert!(output.embedding.l2_norm > 0.0);
    assert_eq!(output.attempts, 1);
    assert!(!output.request_id.is_empty());
}

#[tokio::test]
async fn test_embed_is_deterministic() {
    let orchestrator = local_orchestrator(test_config());
    let cancel = CancellationToken::new();

    let a = assert_ok!(orchestrator.embed(&cancel, "c1ccccc1O").await);
    let b = assert_ok!(orchestrator.embed(&cancel, "c1ccccc1O").await);
    assert_eq!(a.embedding.normalized_vector, b.embedding.normalized_vector);
}

#[tokio::test]
async fn test_embed_rejects_bad_input() {
    let orchestrator = local_orchestrator(test_config());
    let cancel = CancellationToken::new();

    let err = assert_err!(orchestrator.embed(&cancel, "   ").await);
    assert!(matches!(err, InferenceError::InvalidInput(_)));

    let err = assert_err!(orchestrator.embed(&cancel, "C1CC").await);
    assert!(matches!(err, InferenceError::Parse(_)));
    assert!(err.is_validation());

    let err = assert_err!(orchestrator.embed(&cancel, "[C-2147483648]").await);
    assert!(matches!(err, InferenceError::Parse(ParseError::InvalidCharge { .. })));
}

#[tokio::test]
async fn test_embed_retries_transient_failures() {
    let config = test_config();
    let backend = Arc::new(FlakyBackend::new(&config, 2));
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), backend.clone());
    let cancel = CancellationToken::new();

    let output = assert_ok!(orchestrator.embed(&cancel, "CCO").await);
    assert_eq!(output.attempts, 3);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_embed_gives_up_after_max_retries() {
    let config = test_config();
    let backend = Arc::new(FlakyBackend::new(&config, 10));
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), backend.clone());
    let cancel = CancellationToken::new();

    let err = assert_err!(orchestrator.embed(&cancel, "CCO").await);
    match err {
        InferenceError::ModelBackendUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_embed_missing_output_is_invalid() {
    let config = Arc::new(test_config());
    let backend = Arc::new(StaticBackend {
        response: PredictResponse::default(),
    });
    let orchestrator = InferenceOrchestrator::new(config, backend);

    let err = assert_err!(orchestrator.embed(&CancellationToken::new(), "CCO").await);
    assert!(matches!(err, InferenceError::InvalidOutput(_)));
}

#[tokio::test]
async fn test_embed_wrong_dimension_is_invalid() {
    let config = Arc::new(test_config());
    let mut outputs = HashMap::new();
    outputs.insert(
        crate::ml::EMBEDDING_OUTPUT.to_string(),
        crate::ml::encode_embedding(&[0.5f32; 16]),
    );
    let backend = Arc::new(StaticBackend {
        response: PredictResponse {
            outputs,
            inference_time_ms: 1,
        },
    });
    let orchestrator = InferenceOrchestrator::new(config, backend);

    let err = assert_err!(orchestrator.embed(&CancellationToken::new(), "CCO").await);
    assert!(matches!(err, InferenceError::InvalidOutput(_)));
}

#[tokio::test]
async fn test_embed_zero_vector_is_rejected() {
    let config = Arc::new(test_config());
    let mut outputs = HashMap::new();
    outputs.insert(
        crate::ml::EMBEDDING_OUTPUT.to_string(),
        crate::ml::encode_embedding(&[0.0f32; 32]),
    );
    let backend = Arc::new(StaticBackend {
        response: PredictResponse {
            outputs,
            inference_time_ms: 1,
        },
    });
    let orchestrator = InferenceOrchestrator::new(config, backend);

    let err = assert_err!(orchestrator.embed(&CancellationToken::new(), "CCO").await);
    assert!(matches!(err, InferenceError::ZeroVector { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_backend_timeout_is_retried_then_reported() {
    let mut config = test_config();
    config.model.inference_timeout_ms = 50;
    config.inference.max_retries = 1;
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), Arc::new(HangingBackend));

    let err = assert_err!(orchestrator.embed(&CancellationToken::new(), "CCO").await);
    match err {
        InferenceError::ModelBackendUnavailable { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, InferenceError::InferenceTimeout(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_embed_times_out() {
    let orchestrator = InferenceOrchestrator::new(Arc::new(test_config()), Arc::new(HangingBackend));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = assert_err!(orchestrator.embed(&cancel, "CCO").await);
    assert!(matches!(err, InferenceError::InferenceTimeout(_)));
}

#[tokio::test]
async fn test_lifecycle_gates_embedding() {
    let config = test_config();
    let predictor: Arc<dyn Predictor> = Arc::new(LocalPredictor::from_config(&config.model));
    let lifecycle = Arc::new(ModelLifecycleManager::new(
        config.model.clone(),
        predictor.clone(),
        Arc::new(NoopMetrics),
    ));
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), predictor).with_lifecycle(lifecycle.clone());
    let cancel = CancellationToken::new();

    let err = assert_err!(orchestrator.embed(&cancel, "CCO").await);
    assert!(matches!(err, InferenceError::ModelNotReady(ModelState::Unloaded)));

    assert_ok!(lifecycle.load().await);
    assert_ok!(orchestrator.embed(&cancel, "CCO").await);
}

#[tokio::test]
async fn test_batch_embed_preserves_order_and_isolates_failures() {
    let orchestrator = local_orchestrator(test_config());
    let cancel = CancellationToken::new();
    let inputs: Vec<String> = ["CCO", "C1CC", "c1ccccc1", "", "CC(=O)O"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let items = orchestrator.batch_embed(&cancel, &inputs).await;
    assert_eq!(items.len(), 5);
    for (position, item) in items.iter().enumerate() {
        assert_eq!(item.index, position);
    }
    assert!(items[0].result.is_ok());
    assert!(matches!(items[1].result, Err(InferenceError::Parse(_))));
    assert!(items[2].result.is_ok());
    assert!(matches!(items[3].result, Err(InferenceError::InvalidInput(_))));
    assert!(items[4].result.is_ok());

    let single = assert_ok!(orchestrator.embed(&cancel, "c1ccccc1").await);
    let batched = items[2].result.as_ref().map(|o| o.embedding.clone());
    assert_eq!(batched.ok(), Some(single.embedding));
}

#[tokio::test]
async fn test_batch_embed_runs_chunks_concurrently_up_to_chunk_size() {
    let mut config = test_config();
    config.inference.batch_chunk_size = 3;
    let backend = Arc::new(ConcurrencyTrackingBackend {
        inner: LocalPredictor::from_config(&config.model),
        in_flight: AtomicU32::new(0),
        peak: AtomicU32::new(0),
        calls: AtomicU32::new(0),
    });
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), backend.clone());
    let inputs: Vec<String> = ["C", "CC", "CCC", "CCO", "CCN", "c1ccccc1", "CC(=O)O"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let items = orchestrator.batch_embed(&CancellationToken::new(), &inputs).await;
    assert_eq!(items.len(), 7);
    assert!(items.iter().all(|item| item.result.is_ok()));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 7);
    assert_eq!(backend.peak.load(Ordering::SeqCst), 3);
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_embed_empty_input() {
    let orchestrator = local_orchestrator(test_config());
    let items = orchestrator.batch_embed(&CancellationToken::new(), &[]).await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_batch_embed_cancelled_marks_remaining_items() {
    let orchestrator = local_orchestrator(test_config());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let inputs: Vec<String> = vec!["C".into(), "CC".into(), "CCC".into()];

    let items = orchestrator.batch_embed(&cancel, &inputs).await;
    assert_eq!(items.len(), 3);
    assert!(items
        .iter()
        .all(|item| matches!(item.result, Err(InferenceError::InferenceTimeout(_)))));
    assert_eq!(items[2].index, 2);
}

#[tokio::test]
async fn test_identical_molecules_are_highly_similar() {
    let orchestrator = local_orchestrator(test_config());
    let report = assert_ok!(
        orchestrator
            .compute_similarity(&CancellationToken::new(), "CCO", "CCO")
            .await
    );
    assert!((report.cosine - 1.0).abs() < 1e-5);
    assert!(report.fused);
    assert_eq!(report.level, SimilarityLevel::High);
    assert_eq!(report.scores.len(), 1);
}

#[tokio::test]
async fn test_similarity_falls_back_to_raw_cosine() {
    let mut config = test_config();
    config.similarity.fusion_weights = [("morgan".to_string(), 1.0)].into_iter().collect();
    let orchestrator = local_orchestrator(config);

    let report = assert_ok!(
        orchestrator
            .compute_similarity(&CancellationToken::new(), "CCO", "c1ccccc1")
            .await
    );
    assert!(!report.fused);
    assert_eq!(report.score, report.cosine);
    assert_eq!(report.level, orchestrator.postprocessor().classify(report.cosine));
}

#[tokio::test]
async fn test_similarity_propagates_parse_errors() {
    let orchestrator = local_orchestrator(test_config());
    let err = assert_err!(
        orchestrator
            .compute_similarity(&CancellationToken::new(), "CCO", "C(")
            .await
    );
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_multi_signal_fuses_gnn_and_morgan() {
    let orchestrator = local_orchestrator(test_config());
    let report = assert_ok!(
        orchestrator
            .multi_signal_similarity(&CancellationToken::new(), "CCO", "CCN")
            .await
    );

    let gnn = report.scores["gnn"];
    let morgan = report.scores["morgan"];
    assert!((0.0..=1.0).contains(&morgan));
    assert!(morgan < 1.0);
    let expected = ((0.35 * gnn + 0.30 * morgan) / 0.65).clamp(0.0, 1.0);
    assert!((report.score - expected).abs() < 1e-9);
    assert!(report.fused);

    let same = assert_ok!(
        orchestrator
            .multi_signal_similarity(&CancellationToken::new(), "c1ccccc1O", "c1ccccc1O")
            .await
    );
    assert!((same.scores["morgan"] - 1.0).abs() < 1e-12);
    assert_eq!(same.level, SimilarityLevel::High);
}

#[tokio::test]
async fn test_search_without_backend_fails_fast() {
    let config = test_config();
    let backend = Arc::new(FlakyBackend::new(&config, 0));
    let orchestrator = InferenceOrchestrator::new(Arc::new(config), backend.clone());

    let err = assert_err!(
        orchestrator
            .search_similar(&CancellationToken::new(), "CCO", 5, 0.5)
            .await
    );
    assert!(matches!(err, InferenceError::VectorSearchUnavailable));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_classifies_matches_and_applies_defaults() {
    let config = test_config();
    let probe = local_orchestrator(config.clone());
    let cancel = CancellationToken::new();

    let mut entries = Vec::new();
    for (id, smiles) in [("mol-1", "CCO"), ("mol-2", "CCN"), ("mol-3", "c1ccccc1")] {
        let output = assert_ok!(probe.embed(&cancel, smiles).await);
        entries.push((
            VectorMatch {
                molecule_id: id.to_string(),
                smiles: smiles.to_string(),
                score: 0.0,
                properties: Default::default(),
            },
            output.embedding.normalized_vector,
        ));
    }
    let search = Arc::new(InMemorySearch {
        entries,
        calls: Mutex::new(Vec::new()),
    });
    let orchestrator = local_orchestrator(config).with_vector_search(search.clone());

    let hits = assert_ok!(orchestrator.search_similar(&cancel, "CCO", 0, 0.0).await);
    assert!(!hits.is_empty());
    assert_eq!(hits[0].molecule_id, "mol-1");
    assert_eq!(hits[0].level, SimilarityLevel::High);
    for hit in &hits {
        assert!(hit.score >= 0.55);
        assert_eq!(hit.level, orchestrator.postprocessor().classify(hit.score));
    }

    let hits = assert_ok!(orchestrator.search_similar(&cancel, "CCO", 1, 0.9).await);
    assert_eq!(hits.len(), 1);

    let calls = search.calls.lock().map(|c| c.clone()).unwrap_or_default();
    assert_eq!(calls, vec![(10, 0.55), (1, 0.9)]);
}

#[tokio::test]
async fn test_metrics_and_ids_recorded() {
    let metrics = Arc::new(RecordingMetrics::default());
    let orchestrator = local_orchestrator(test_config())
        .with_metrics(metrics.clone())
        .with_id_generator(Arc::new(SequentialIds(AtomicU32::new(0))));
    let cancel = CancellationToken::new();

    let output = assert_ok!(orchestrator.embed(&cancel, "CCO").await);
    assert_eq!(output.request_id, "req-0");
    assert_err!(orchestrator.embed(&cancel, "C1C").await);
    let inputs = vec!["C".to_string(), "CC".to_string(), "CCC".to_string()];
    orchestrator.batch_embed(&cancel, &inputs).await;

    let events = metrics.events.lock().map(|e| e.clone()).unwrap_or_default();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].task_type, "embed");
    assert!(events[0].success);
    assert!(!events[1].success);
    assert_eq!(events[2].task_type, "batch_embed");
    assert_eq!(events[2].batch_size, 3);
    assert!(events[2].success);
    assert!(events.iter().all(|e| e.model == "molgraph-gnn"));
}
