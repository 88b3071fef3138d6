/// Model serving seam
///
/// This module contains:
/// - The Predictor trait and its request/response types
/// - LocalPredictor, a deterministic in-process backend
/// - HttpPredictor, a client for a remote model server
/// - Envelope and output codecs
/// - ModelLifecycleManager owning the load/unload state machine

pub mod codec;
pub mod http;
pub mod lifecycle;
pub mod local;
pub mod predictor;


pub use codec::{decode_embedding, decode_graph, encode_embedding, encode_graph, EMBEDDING_OUTPUT};
pub use http::HttpPredictor;
pub use lifecycle::{ModelLifecycleManager, ModelState, ModelStats};
pub use local::LocalPredictor;
pub use predictor::{build_predictor, PredictRequest, PredictResponse, Predictor};
