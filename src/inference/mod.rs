//! Request orchestration
//!
//! `InferenceOrchestrator` runs the full parse, encode, predict and
//! postprocess pipeline. Backend calls go through `RetryExecutor`, which
//! retries transient failures with exponential backoff and honors a
//! caller-supplied `CancellationToken`.

pub mod orchestrator;
pub mod retry;
pub mod vector_search;

#[cfg(test)]
mod tests;

pub use orchestrator::{InferenceOrchestrator, GNN_SIGNAL, MORGAN_SIGNAL};
pub use retry::{Retried, RetryDecision, RetryExecutor, RetryPolicy, RetryState};
pub use vector_search::VectorSearch;
