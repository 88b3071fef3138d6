//! Molecular graph inference: SMILES and MOL parsing, GNN feature encoding,
//! predictor backends with retries, and similarity postprocessing.

pub mod chem;
pub mod config;
pub mod error;
pub mod inference;
pub mod ml;
pub mod observability;
pub mod similarity;
pub mod types;

pub use chem::GraphBuilder;
pub use config::Config;
pub use error::{InferenceError, InferenceResult, ParseError};
pub use inference::{InferenceOrchestrator, RetryExecutor, RetryPolicy, VectorSearch};
pub use ml::{build_predictor, ModelLifecycleManager, ModelState, ModelStats, Predictor};
pub use observability::{init_tracing, MetricsRecorder, PrometheusMetrics};
pub use similarity::Postprocessor;
pub use types::*;
