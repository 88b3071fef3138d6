use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{InferenceError, InferenceResult};
use crate::similarity::SimilarityThresholds;

/// Inference core configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// GNN model configuration
    pub model: GnnModelConfig,
    /// Orchestration configuration
    pub inference: InferenceConfig,
    /// Similarity scoring configuration
    pub similarity: SimilarityConfig,
    /// Parser configuration
    pub parser: ParserConfig,
}

/// Predictor backend, chosen once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Deterministic in-process projection
    Local,
    /// Remote model server over HTTP
    Http,
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackendType::Local),
            "http" => Ok(BackendType::Http),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Wire format of the request envelope sent to the predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Json,
    PackedF32,
}

impl InputFormat {
    /// Header value announcing the format
    pub fn as_str(self) -> &'static str {
        match self {
            InputFormat::Json => "json",
            InputFormat::PackedF32 => "packed_f32",
        }
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(InputFormat::Json),
            "packed_f32" | "packed" => Ok(InputFormat::PackedF32),
            other => Err(format!("unknown input format '{}'", other)),
        }
    }
}

/// What to do with disconnected SMILES fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentPolicy {
    /// Keep every fragment in one graph
    #[default]
    KeepAll,
    /// Keep only the fragment with the most atoms
    LargestOnly,
}

impl FromStr for FragmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep_all" | "all" => Ok(FragmentPolicy::KeepAll),
            "largest_only" | "largest" => Ok(FragmentPolicy::LargestOnly),
            other => Err(format!("unknown fragment policy '{}'", other)),
        }
    }
}

/// GNN model configuration
#[derive(Debug, Clone)]
pub struct GnnModelConfig {
    pub model_name: String,
    pub model_version: String,
    /// Output embedding dimension
    pub embedding_dim: usize,
    /// Largest molecule accepted by the graph builder
    pub max_atoms: usize,
    pub num_layers: usize,
    pub hidden_dim: usize,
    pub backend: BackendType,
    /// Base URL of the model server, used by the HTTP backend
    pub endpoint: String,
    pub input_format: InputFormat,
    /// Per-call inference timeout in milliseconds
    pub inference_timeout_ms: u64,
    /// Health probe timeout during load in milliseconds
    pub load_timeout_ms: u64,
    /// Run a trivial prediction after loading
    pub warmup_enabled: bool,
    /// Seed of the local backend projection matrix
    pub projection_seed: u64,
}

impl GnnModelConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for GnnModelConfig {
    fn default() -> Self {
        GnnModelConfig {
            model_name: "molgraph-gnn".to_string(),
            model_version: "1".to_string(),
            embedding_dim: 256,
            max_atoms: 200,
            num_layers: 4,
            hidden_dim: 256,
            backend: BackendType::Local,
            endpoint: "http://localhost:8501".to_string(),
            input_format: InputFormat::Json,
            inference_timeout_ms: 5000,
            load_timeout_ms: 30000,
            warmup_enabled: true,
            projection_seed: 42,
        }
    }
}

/// Orchestration configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Extra attempts after the first transient failure
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Fraction of each delay randomized, 0 disables jitter
    pub retry_jitter_factor: f64,
    /// Items embedded concurrently per batch chunk
    pub batch_chunk_size: usize,
    pub default_top_k: usize,
    pub default_search_threshold: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            max_retries: 2,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
            retry_jitter_factor: 0.0,
            batch_chunk_size: 64,
            default_top_k: 10,
            default_search_threshold: 0.55,
        }
    }
}

/// Similarity scoring configuration
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_threshold: f64,
    /// Weight per named similarity signal
    pub fusion_weights: HashMap<String, f64>,
    pub fingerprint_bits: usize,
    pub fingerprint_radius: usize,
}

impl SimilarityConfig {
    pub fn thresholds(&self) -> SimilarityThresholds {
        SimilarityThresholds {
            high: self.high_threshold,
            medium: self.medium_threshold,
            low: self.low_threshold,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        let thresholds = SimilarityThresholds::default();
        SimilarityConfig {
            high_threshold: thresholds.high,
            medium_threshold: thresholds.medium,
            low_threshold: thresholds.low,
            fusion_weights: crate::similarity::default_fusion_weights(),
            fingerprint_bits: 2048,
            fingerprint_radius: 2,
        }
    }
}

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub max_smiles_length: usize,
    pub fragment_policy: FragmentPolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_smiles_length: crate::chem::parser::DEFAULT_MAX_SMILES_LENGTH,
            fragment_policy: FragmentPolicy::KeepAll,
        }
    }
}

/// Parse `key` when present, keep `default` otherwise
fn var_or<T, F>(lookup: &F, key: &str, default: T) -> InferenceResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| InferenceError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Parse `FUSION_WEIGHTS` style lists: `morgan:0.3,gnn:0.35`
pub fn parse_fusion_weights(raw: &str) -> InferenceResult<HashMap<String, f64>> {
    let mut weights = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, weight) = entry.split_once(':').ok_or_else(|| {
            InferenceError::Config(format!("Invalid FUSION_WEIGHTS entry '{}'", entry))
        })?;
        let weight: f64 = weight.trim().parse().map_err(|e| {
            InferenceError::Config(format!("Invalid FUSION_WEIGHTS weight for '{}': {}", name, e))
        })?;
        weights.insert(name.trim().to_string(), weight);
    }
    if weights.is_empty() {
        return Err(InferenceError::Config("FUSION_WEIGHTS is empty".to_string()));
    }
    Ok(weights)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> InferenceResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("Could not load .env file: {}", e);
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> InferenceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_defaults = GnnModelConfig::default();
        let inference_defaults = InferenceConfig::default();
        let similarity_defaults = SimilarityConfig::default();
        let parser_defaults = ParserConfig::default();

        let fusion_weights = match lookup("FUSION_WEIGHTS") {
            Some(raw) => parse_fusion_weights(&raw)?,
            None => similarity_defaults.fusion_weights,
        };

        let config = Config {
            model: GnnModelConfig {
                model_name: lookup("MODEL_NAME").unwrap_or(model_defaults.model_name),
                model_version: lookup("MODEL_VERSION").unwrap_or(model_defaults.model_version),
                embedding_dim: var_or(&lookup, "EMBEDDING_DIM", model_defaults.embedding_dim)?,
                max_atoms: var_or(&lookup, "MAX_ATOMS", model_defaults.max_atoms)?,
                num_layers: var_or(&lookup, "NUM_LAYERS", model_defaults.num_layers)?,
                hidden_dim: var_or(&lookup, "HIDDEN_DIM", model_defaults.hidden_dim)?,
                backend: var_or(&lookup, "MODEL_BACKEND", model_defaults.backend)?,
                endpoint: lookup("MODEL_ENDPOINT").unwrap_or(model_defaults.endpoint),
                input_format: var_or(&lookup, "MODEL_INPUT_FORMAT", model_defaults.input_format)?,
                inference_timeout_ms: var_or(
                    &lookup,
                    "INFERENCE_TIMEOUT_MS",
                    model_defaults.inference_timeout_ms,
                )?,
                load_timeout_ms: var_or(&lookup, "MODEL_LOAD_TIMEOUT_MS", model_defaults.load_timeout_ms)?,
                warmup_enabled: var_or(&lookup, "MODEL_WARMUP_ENABLED", model_defaults.warmup_enabled)?,
                projection_seed: var_or(&lookup, "PROJECTION_SEED", model_defaults.projection_seed)?,
            },
            inference: InferenceConfig {
                max_retries: var_or(&lookup, "MAX_RETRIES", inference_defaults.max_retries)?,
                retry_base_delay_ms: var_or(
                    &lookup,
                    "RETRY_BASE_DELAY_MS",
                    inference_defaults.retry_base_delay_ms,
                )?,
                retry_max_delay_ms: var_or(
                    &lookup,
                    "RETRY_MAX_DELAY_MS",
                    inference_defaults.retry_max_delay_ms,
                )?,
                retry_jitter_factor: var_or(
                    &lookup,
                    "RETRY_JITTER_FACTOR",
                    inference_defaults.retry_jitter_factor,
                )?,
                batch_chunk_size: var_or(&lookup, "BATCH_CHUNK_SIZE", inference_defaults.batch_chunk_size)?,
                default_top_k: var_or(&lookup, "DEFAULT_TOP_K", inference_defaults.default_top_k)?,
                default_search_threshold: var_or(
                    &lookup,
                    "DEFAULT_SEARCH_THRESHOLD",
                    inference_defaults.default_search_threshold,
                )?,
            },
            similarity: SimilarityConfig {
                high_threshold: var_or(&lookup, "SIMILARITY_HIGH", similarity_defaults.high_threshold)?,
                medium_threshold: var_or(
                    &lookup,
                    "SIMILARITY_MEDIUM",
                    similarity_defaults.medium_threshold,
                )?,
                low_threshold: var_or(&lookup, "SIMILARITY_LOW", similarity_defaults.low_threshold)?,
                fusion_weights,
                fingerprint_bits: var_or(&lookup, "FINGERPRINT_BITS", similarity_defaults.fingerprint_bits)?,
                fingerprint_radius: var_or(
                    &lookup,
                    "FINGERPRINT_RADIUS",
                    similarity_defaults.fingerprint_radius,
                )?,
            },
            parser: ParserConfig {
                max_smiles_length: var_or(&lookup, "MAX_SMILES_LENGTH", parser_defaults.max_smiles_length)?,
                fragment_policy: var_or(&lookup, "FRAGMENT_POLICY", parser_defaults.fragment_policy)?,
            },
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> InferenceResult<()> {
        // Validate model config
        if self.model.model_name.trim().is_empty() {
            return Err(InferenceError::Config("MODEL_NAME cannot be empty".to_string()));
        }

        if self.model.embedding_dim == 0 {
            return Err(InferenceError::Config("Embedding dimension must be greater than 0".to_string()));
        }

        if self.model.max_atoms == 0 {
            return Err(InferenceError::Config("MAX_ATOMS must be greater than 0".to_string()));
        }

        if self.model.num_layers == 0 || self.model.hidden_dim == 0 {
            return Err(InferenceError::Config(
                "NUM_LAYERS and HIDDEN_DIM must be greater than 0".to_string(),
            ));
        }

        if self.model.inference_timeout_ms == 0 || self.model.load_timeout_ms == 0 {
            return Err(InferenceError::Config("Model timeouts must be greater than 0".to_string()));
        }

        if self.model.backend == BackendType::Http {
            let url = Url::parse(&self.model.endpoint)
                .map_err(|e| InferenceError::Config(format!("Invalid MODEL_ENDPOINT: {}", e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(InferenceError::Config(
                    "MODEL_ENDPOINT must start with http:// or https://".to_string(),
                ));
            }
        }

        // Validate inference config
        if self.inference.batch_chunk_size == 0 {
            return Err(InferenceError::Config("BATCH_CHUNK_SIZE must be greater than 0".to_string()));
        }

        if self.inference.retry_base_delay_ms > self.inference.retry_max_delay_ms {
            return Err(InferenceError::Config(
                "RETRY_BASE_DELAY_MS cannot exceed RETRY_MAX_DELAY_MS".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.inference.retry_jitter_factor) {
            return Err(InferenceError::Config("RETRY_JITTER_FACTOR must be within [0, 1]".to_string()));
        }

        if self.inference.default_top_k == 0 {
            return Err(InferenceError::Config("DEFAULT_TOP_K must be greater than 0".to_string()));
        }

        if !(self.inference.default_search_threshold > 0.0 && self.inference.default_search_threshold <= 1.0) {
            return Err(InferenceError::Config(
                "DEFAULT_SEARCH_THRESHOLD must be within (0, 1]".to_string(),
            ));
        }

        // Validate similarity config
        self.similarity.thresholds().validate()?;

        if let Some((name, _)) = self
            .similarity
            .fusion_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(InferenceError::Config(format!(
                "FUSION_WEIGHTS weight for '{}' must be a non-negative number",
                name
            )));
        }

        if self.similarity.fingerprint_bits == 0 || self.similarity.fingerprint_bits % 8 != 0 {
            return Err(InferenceError::Config(
                "FINGERPRINT_BITS must be a positive multiple of 8".to_string(),
            ));
        }

        // Validate parser config
        if self.parser.max_smiles_length == 0 {
            return Err(InferenceError::Config("MAX_SMILES_LENGTH must be greater than 0".to_string()));
        }

        Ok(())
    }
}
