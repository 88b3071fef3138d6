use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::chem::GraphBuilder;
use crate::config::GnnModelConfig;
use crate::error::{InferenceError, InferenceResult};
use crate::ml::codec::encode_graph;
use crate::ml::predictor::{PredictRequest, Predictor};
use crate::observability::{MetricsRecorder, ModelLoadEvent};

/// Molecule used for the warmup prediction
const WARMUP_SMILES: &str = "C";

/// Model lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Error,
    Unloading,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Error => "error",
            ModelState::Unloading => "unloading",
        };
        f.write_str(label)
    }
}

/// Snapshot of lifecycle bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub model_name: String,
    pub model_version: String,
    pub state: ModelState,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_load_latency: Option<Duration>,
    pub last_error: Option<String>,
    pub load_count: u64,
}

struct LifecycleInner {
    state: ModelState,
    loaded_at: Option<DateTime<Utc>>,
    last_load_latency: Option<Duration>,
    last_error: Option<String>,
    load_count: u64,
}

/// Owns the model state machine
///
/// `Unloaded -> Loading -> Ready -> Unloading -> Unloaded`, with `Loading`
/// and `Unloading` falling into `Error` on failure. The state lock is
/// released before any backend call.
pub struct ModelLifecycleManager {
    config: GnnModelConfig,
    predictor: Arc<dyn Predictor>,
    metrics: Arc<dyn MetricsRecorder>,
    inner: RwLock<LifecycleInner>,
}

impl ModelLifecycleManager {
    pub fn new(config: GnnModelConfig, predictor: Arc<dyn Predictor>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            config,
            predictor,
            metrics,
            inner: RwLock::new(LifecycleInner {
                state: ModelState::Unloaded,
                loaded_at: None,
                last_load_latency: None,
                last_error: None,
                load_count: 0,
            }),
        }
    }

    pub async fn state(&self) -> ModelState {
        self.inner.read().await.state
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == ModelState::Ready
    }

    /// Fail with `ModelNotReady` unless the model is `Ready`
    pub async fn ensure_ready(&self) -> InferenceResult<()> {
        match self.state().await {
            ModelState::Ready => Ok(()),
            state => Err(InferenceError::ModelNotReady(state)),
        }
    }

    pub async fn stats(&self) -> ModelStats {
        let inner = self.inner.read().await;
        ModelStats {
            model_name: self.config.model_name.clone(),
            model_version: self.config.model_version.clone(),
            state: inner.state,
            loaded_at: inner.loaded_at,
            last_load_latency: inner.last_load_latency,
            last_error: inner.last_error.clone(),
            load_count: inner.load_count,
        }
    }

    /// Probe the backend and move to `Ready`
    #[instrument(skip(self), fields(model = %self.config.model_name, version = %self.config.model_version))]
    pub async fn load(&self) -> InferenceResult<()> {
        {
            let mut inner = self.inner.write().await;
            match inner.state {
                ModelState::Ready => return Ok(()),
                ModelState::Loading | ModelState::Unloading => {
                    return Err(InferenceError::InvalidState(format!(
                        "cannot load while {}",
                        inner.state
                    )))
                }
                ModelState::Unloaded | ModelState::Error => inner.state = ModelState::Loading,
            }
        }

        info!("Loading model");
        let start = Instant::now();

        if let Err(e) = self.probe().await {
            let latency = start.elapsed();
            {
                let mut inner = self.inner.write().await;
                inner.state = ModelState::Error;
                inner.last_error = Some(e.to_string());
                inner.last_load_latency = Some(latency);
            }
            self.record_load(latency, false);
            error!("Model load failed: {}", e);
            return Err(e);
        }

        if self.config.warmup_enabled {
            if let Err(e) = self.warmup().await {
                warn!("Model warmup failed, continuing: {}", e);
            }
        }

        let latency = start.elapsed();
        {
            let mut inner = self.inner.write().await;
            inner.state = ModelState::Ready;
            inner.loaded_at = Some(Utc::now());
            inner.last_load_latency = Some(latency);
            inner.last_error = None;
            inner.load_count += 1;
        }
        self.record_load(latency, true);
        info!(latency_ms = latency.as_millis() as u64, "Model ready");
        Ok(())
    }

    /// Close the backend and move to `Unloaded`
    #[instrument(skip(self), fields(model = %self.config.model_name))]
    pub async fn unload(&self) -> InferenceResult<()> {
        {
            let mut inner = self.inner.write().await;
            match inner.state {
                ModelState::Unloaded => return Ok(()),
                ModelState::Loading | ModelState::Unloading => {
                    return Err(InferenceError::InvalidState(format!(
                        "cannot unload while {}",
                        inner.state
                    )))
                }
                ModelState::Ready | ModelState::Error => inner.state = ModelState::Unloading,
            }
        }

        let result = self.predictor.close().await;

        let mut inner = self.inner.write().await;
        match result {
            Ok(()) => {
                inner.state = ModelState::Unloaded;
                inner.loaded_at = None;
                info!("Model unloaded");
                Ok(())
            }
            Err(e) => {
                inner.state = ModelState::Error;
                inner.last_error = Some(e.to_string());
                error!("Model unload failed: {}", e);
                Err(e)
            }
        }
    }

    async fn probe(&self) -> InferenceResult<()> {
        let timeout = self.config.load_timeout();
        match tokio::time::timeout(timeout, self.predictor.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::InferenceTimeout(format!(
                "health probe exceeded {:?}",
                timeout
            ))),
        }
    }

    async fn warmup(&self) -> InferenceResult<()> {
        let graph = GraphBuilder::default().build(WARMUP_SMILES)?;
        let request = PredictRequest {
            model_name: self.config.model_name.clone(),
            input: encode_graph(&graph, self.config.input_format)?,
            input_format: self.config.input_format,
            input_digest: graph.content_digest(),
        };
        let timeout = self.config.inference_timeout();
        match tokio::time::timeout(timeout, self.predictor.predict(&request)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(InferenceError::InferenceTimeout(format!("warmup exceeded {:?}", timeout))),
        }
    }

    fn record_load(&self, latency: Duration, success: bool) {
        self.metrics.record_model_load(&ModelLoadEvent {
            model: self.config.model_name.clone(),
            duration_ms: latency.as_secs_f64() * 1000.0,
            success,
        });
    }
}
