pub mod ml_model;
pub mod inference;

pub use ml_model::{BookClassifier, ModelConfig};
pub use inference::{load_classifier, untrained_weights, CpuBackend, GpuBackend, InferenceEngine};
