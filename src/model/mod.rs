pub mod model_metadata;
pub mod model_storage;
pub mod inference_config;
pub mod config;

pub use model_metadata::{ModelMetadata, DEFAULT_CLASS_LABELS};
pub use model_storage::{save_model_bundle, load_metadata, load_weights, load_model_bundle, print_metadata_info};
pub use inference_config::InferenceConfig;
pub use config::{AppConfig, DeviceType, ModelSettings, CaptureSettings, DecisionSettings};
