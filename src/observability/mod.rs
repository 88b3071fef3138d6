pub mod ids;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use ids::{IdGenerator, UuidIdGenerator};
pub use logging::loggable_smiles;
pub use metrics::{InferenceEvent, MetricsRecorder, ModelLoadEvent, NoopMetrics, PrometheusMetrics};
pub use self::tracing::init_tracing;
