use thiserror::Error;

use crate::ml::lifecycle::ModelState;

/// Main error type for the inference core
#[derive(Debug, Error)]
pub enum InferenceError {
    /// SMILES or MOL block could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid request parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector length does not match the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Parsed molecule has no atoms
    #[error("No atoms found in molecule")]
    NoAtomsFound,

    /// Parsed molecule exceeds the configured atom limit
    #[error("Molecule too large: {atoms} atoms exceeds limit of {max}")]
    MoleculeTooLarge { atoms: usize, max: usize },

    /// A batch item failed, aborting the batch
    #[error("Batch item {index} failed: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<InferenceError>,
    },

    /// Serving backend is temporarily unavailable
    #[error("Serving backend unavailable: {0}")]
    ServingUnavailable(String),

    /// Backend call timed out or was cancelled
    #[error("Inference timeout: {0}")]
    InferenceTimeout(String),

    /// Non-transient predictor failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Predictor responded with an unusable payload
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    /// Transient failures persisted through every retry
    #[error("Model backend unavailable after {attempts} attempts: {source}")]
    ModelBackendUnavailable {
        attempts: u32,
        #[source]
        source: Box<InferenceError>,
    },

    /// Vector norm is too small to normalize
    #[error("Cannot normalize zero vector (norm {norm:e})")]
    ZeroVector { norm: f64 },

    /// Cosine similarity input with zero norm
    #[error("Cosine similarity undefined for zero-norm vector")]
    ZeroNorm,

    /// Fusion found no score with a configured weight
    #[error("No matching weights for scores: {0}")]
    NoMatchingWeights(String),

    /// Model is not ready to serve requests
    #[error("Model not ready (state: {0})")]
    ModelNotReady(ModelState),

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),

    /// No vector search collaborator configured
    #[error("Vector search backend not configured")]
    VectorSearchUnavailable,

    /// Vector search collaborator failed
    #[error("Vector search error: {0}")]
    VectorSearch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    /// Transient backend failures are the only ones worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::ServingUnavailable(_) | InferenceError::InferenceTimeout(_)
        )
    }

    /// Check if error was caused by the caller's input
    pub fn is_validation(&self) -> bool {
        match self {
            InferenceError::Parse(_)
            | InferenceError::InvalidInput(_)
            | InferenceError::DimensionMismatch { .. }
            | InferenceError::NoAtomsFound
            | InferenceError::MoleculeTooLarge { .. } => true,
            InferenceError::BatchItem { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// Stable label used in logs and metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            InferenceError::Parse(_) => "parse",
            InferenceError::InvalidInput(_) => "invalid_input",
            InferenceError::DimensionMismatch { .. } => "dimension_mismatch",
            InferenceError::NoAtomsFound => "no_atoms",
            InferenceError::MoleculeTooLarge { .. } => "molecule_too_large",
            InferenceError::BatchItem { .. } => "batch_item",
            InferenceError::ServingUnavailable(_) => "serving_unavailable",
            InferenceError::InferenceTimeout(_) => "timeout",
            InferenceError::Backend(_) => "backend",
            InferenceError::InvalidOutput(_) => "invalid_output",
            InferenceError::ModelBackendUnavailable { .. } => "backend_unavailable",
            InferenceError::ZeroVector { .. } => "zero_vector",
            InferenceError::ZeroNorm => "zero_norm",
            InferenceError::NoMatchingWeights(_) => "no_matching_weights",
            InferenceError::ModelNotReady(_) => "model_not_ready",
            InferenceError::InvalidState(_) => "invalid_state",
            InferenceError::VectorSearchUnavailable => "vector_search_unavailable",
            InferenceError::VectorSearch(_) => "vector_search",
            InferenceError::Config(_) => "config",
            InferenceError::Serialization(_) => "serialization",
            InferenceError::Internal(_) => "internal",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            InferenceError::Parse(_) => 400,
            InferenceError::InvalidInput(_) => 400,
            InferenceError::DimensionMismatch { .. } => 400,
            InferenceError::NoAtomsFound => 422,
            InferenceError::MoleculeTooLarge { .. } => 422,
            InferenceError::BatchItem { source, .. } => source.status_code(),
            InferenceError::ServingUnavailable(_) => 503,
            InferenceError::ModelBackendUnavailable { .. } => 503,
            InferenceError::ModelNotReady(_) => 503,
            InferenceError::VectorSearchUnavailable => 503,
            InferenceError::InferenceTimeout(_) => 504,
            InferenceError::Backend(_) => 500,
            InferenceError::InvalidOutput(_) => 500,
            InferenceError::ZeroVector { .. } => 500,
            InferenceError::ZeroNorm => 500,
            InferenceError::NoMatchingWeights(_) => 500,
            InferenceError::InvalidState(_) => 500,
            InferenceError::VectorSearch(_) => 500,
            InferenceError::Config(_) => 500,
            InferenceError::Serialization(_) => 500,
            InferenceError::Internal(_) => 500,
        }
    }
}

/// Result type alias for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Structural and lexical failures from the SMILES and MOL block parsers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty input")]
    EmptyInput,

    #[error("input length {length} exceeds maximum of {max}")]
    TooLong { length: usize, max: usize },

    #[error("invalid character '{ch}' at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("reaction SMILES are not supported")]
    ReactionNotSupported,

    #[error("unbalanced brackets at position {position}")]
    UnbalancedBrackets { position: usize },

    #[error("unmatched ring closure {label}")]
    UnmatchedRingClosure { label: u32 },

    #[error("unclosed bracket atom starting at position {position}")]
    UnclosedBracket { position: usize },

    #[error("unknown element '{symbol}' at position {position}")]
    UnknownElement { symbol: String, position: usize },

    #[error("unexpected '{token}' at position {position}")]
    UnexpectedToken { token: char, position: usize },

    #[error("formal charge at position {position} does not fit a single atom")]
    InvalidCharge { position: usize },

    #[error("MOL block line {line}: {reason}")]
    MolBlock { line: usize, reason: String },
}
