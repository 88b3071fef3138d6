use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::warn;

use crate::error::{InferenceError, InferenceResult};

/// One orchestrated inference, reported after it completes
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceEvent {
    pub model: String,
    /// `embed`, `batch_embed`, `similarity`, ...
    pub task_type: String,
    pub duration_ms: f64,
    pub success: bool,
    pub batch_size: usize,
}

/// One model load attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLoadEvent {
    pub model: String,
    pub duration_ms: f64,
    pub success: bool,
}

/// Fire-and-forget metrics sink
///
/// Implementations must not block and must not fail the caller.
pub trait MetricsRecorder: Send + Sync {
    fn record_inference(&self, event: &InferenceEvent);

    fn record_model_load(&self, _event: &ModelLoadEvent) {}
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_inference(&self, _event: &InferenceEvent) {}
}

/// Prometheus-backed recorder with its own registry
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    inference_total: CounterVec,
    inference_errors_total: CounterVec,
    inference_duration_seconds: HistogramVec,
    batch_size: Histogram,
    model_loads_total: CounterVec,
    model_load_duration_seconds: Histogram,
}

fn metric_error(name: &str, e: prometheus::Error) -> InferenceError {
    InferenceError::Internal(format!("Failed to create {} metric: {}", name, e))
}

impl PrometheusMetrics {
    /// Create a recorder with all collectors registered
    pub fn new() -> InferenceResult<Self> {
        let registry = Arc::new(Registry::new());

        let inference_total = CounterVec::new(
            Opts::new("molgraph_inference_total", "Total number of inference requests"),
            &["model", "task_type"],
        )
        .map_err(|e| metric_error("molgraph_inference_total", e))?;

        let inference_errors_total = CounterVec::new(
            Opts::new("molgraph_inference_errors_total", "Total number of failed inference requests"),
            &["model", "task_type"],
        )
        .map_err(|e| metric_error("molgraph_inference_errors_total", e))?;

        let inference_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "molgraph_inference_duration_seconds",
                "Duration of inference requests in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["model", "task_type"],
        )
        .map_err(|e| metric_error("molgraph_inference_duration_seconds", e))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("molgraph_batch_size", "Number of molecules per inference request")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0]),
        )
        .map_err(|e| metric_error("molgraph_batch_size", e))?;

        let model_loads_total = CounterVec::new(
            Opts::new("molgraph_model_loads_total", "Total number of model load attempts"),
            &["model", "outcome"],
        )
        .map_err(|e| metric_error("molgraph_model_loads_total", e))?;

        let model_load_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("molgraph_model_load_duration_seconds", "Duration of model loads in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        )
        .map_err(|e| metric_error("molgraph_model_load_duration_seconds", e))?;

        // Register all metrics
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(inference_total.clone()),
            Box::new(inference_errors_total.clone()),
            Box::new(inference_duration_seconds.clone()),
            Box::new(batch_size.clone()),
            Box::new(model_loads_total.clone()),
            Box::new(model_load_duration_seconds.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| InferenceError::Internal(format!("Failed to register metric: {}", e)))?;
        }

        Ok(Self {
            registry,
            inference_total,
            inference_errors_total,
            inference_duration_seconds,
            batch_size,
            model_loads_total,
            model_load_duration_seconds,
        })
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> InferenceResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| InferenceError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| InferenceError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    /// Get the underlying registry for exposition by the host service
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn record_inference(&self, event: &InferenceEvent) {
        let labels = [event.model.as_str(), event.task_type.as_str()];
        match self.inference_total.get_metric_with_label_values(&labels) {
            Ok(counter) => counter.inc(),
            Err(e) => {
                warn!("Dropping inference metric: {}", e);
                return;
            }
        }
        if !event.success {
            self.inference_errors_total.with_label_values(&labels).inc();
        }
        self.inference_duration_seconds
            .with_label_values(&labels)
            .observe(event.duration_ms / 1000.0);
        self.batch_size.observe(event.batch_size as f64);
    }

    fn record_model_load(&self, event: &ModelLoadEvent) {
        let outcome = if event.success { "success" } else { "failure" };
        self.model_loads_total
            .with_label_values(&[event.model.as_str(), outcome])
            .inc();
        self.model_load_duration_seconds.observe(event.duration_ms / 1000.0);
    }
}
