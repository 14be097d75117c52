//! モデル推論機能

use std::path::Path;
use std::sync::Arc;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use burn_ndarray::NdArray;
use burn_wgpu::Wgpu;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::ml::{BookClassifier, ModelConfig};
use crate::model::{load_model_bundle, DeviceType, InferenceConfig, ModelMetadata};
use crate::recognition::Classifier;
use crate::types::InputTensor;

/// CPU バックエンド
pub type CpuBackend = NdArray<f32>;

/// GPU バックエンド
pub type GpuBackend = Wgpu;

/// 重みは f32 のまま保存する
type WeightsRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// 推論エンジン
///
/// 読み込み後のモデルは不変。Burn のモジュールは `Sync` ではないため Mutex で包む。
pub struct InferenceEngine<B: Backend> {
    model: Mutex<BookClassifier<B>>,
    config: InferenceConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルバンドルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P) -> PipelineResult<Self> {
        let model_path = model_path.as_ref();
        let (metadata, weights) = load_model_bundle(model_path)
            .map_err(|e| PipelineError::AssetLoad(format!("{}: {:#}", model_path.display(), e)))?;

        let engine = Self::from_parts(&metadata, weights)?;
        info!(
            path = %model_path.display(),
            classes = engine.config.num_classes(),
            "モデルを読み込みました"
        );
        Ok(engine)
    }

    /// トポロジーと重みバイト列から初期化
    pub fn from_parts(metadata: &ModelMetadata, weights: Vec<u8>) -> PipelineResult<Self> {
        metadata
            .validate()
            .map_err(|e| PipelineError::AssetLoad(e.to_string()))?;

        let config = InferenceConfig::from_metadata(metadata);
        let device = B::Device::default();

        // 推論時は学習時と同じトポロジーで初期化してから重みを復元する
        let model = model_config(&config).init::<B>(&device);

        let recorder = WeightsRecorder::default();
        let record = <WeightsRecorder as Recorder<B>>::load(&recorder, weights, &device)
            .map_err(|e| PipelineError::AssetLoad(format!("モデル重みの読み込みエラー: {:?}", e)))?;

        let model = model.load_record(record);

        Ok(Self {
            model: Mutex::new(model),
            config,
            device,
        })
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

impl<B: Backend> Classifier for InferenceEngine<B> {
    fn input_shape(&self) -> [usize; 4] {
        self.config.input_shape()
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes()
    }

    fn predict(&self, input: &InputTensor) -> PipelineResult<Vec<f32>> {
        let expected = self.input_shape();
        if input.shape != expected || input.len() != expected.iter().product::<usize>() {
            return Err(PipelineError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: input.shape.to_vec(),
            });
        }

        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(input.data.clone(), input.shape),
            &self.device,
        );

        let probabilities = self
            .model
            .lock()
            .predict_proba(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Task(format!("推論結果の取得エラー: {:?}", e)))?;

        if probabilities.len() != self.num_classes() {
            return Err(PipelineError::ShapeMismatch {
                expected: vec![self.num_classes()],
                actual: vec![probabilities.len()],
            });
        }

        Ok(probabilities)
    }
}

fn model_config(config: &InferenceConfig) -> ModelConfig {
    ModelConfig::new(config.num_classes())
        .with_hidden_size(config.hidden_size)
        .with_image_size(config.model_input_size as usize)
}

/// 重みをランダム初期化したモデルのバイト列を作る
///
/// 配線確認用。学習済みモデルではない。
pub fn untrained_weights<B: Backend>(metadata: &ModelMetadata) -> PipelineResult<Vec<u8>> {
    let device = B::Device::default();
    let model = model_config(&InferenceConfig::from_metadata(metadata)).init::<B>(&device);
    let recorder = WeightsRecorder::default();
    <WeightsRecorder as Recorder<B>>::record(&recorder, model.into_record(), ())
        .map_err(|e| PipelineError::AssetLoad(format!("モデル重みの書き出しエラー: {:?}", e)))
}

/// 設定されたデバイスで分類器を読み込む
///
/// プロセス起動時に一度だけ呼び、結果を共有する。バンドルは1回だけ展開し、
/// 推論設定（ラベル表など）も合わせて返す。
pub fn load_classifier(
    model_path: &Path,
    device: DeviceType,
) -> PipelineResult<(Arc<dyn Classifier>, InferenceConfig)> {
    info!(device = %device, "推論デバイス");
    match device {
        DeviceType::Cpu => Ok(shared(InferenceEngine::<CpuBackend>::load(model_path)?)),
        DeviceType::Wgpu => Ok(shared(InferenceEngine::<GpuBackend>::load(model_path)?)),
    }
}

fn shared<B: Backend>(engine: InferenceEngine<B>) -> (Arc<dyn Classifier>, InferenceConfig) {
    let config = engine.config().clone();
    (Arc::new(engine), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::save_model_bundle;

    fn small_metadata() -> ModelMetadata {
        let mut metadata = ModelMetadata::with_default_labels(16);
        metadata.input_size = 64;
        metadata
    }

    fn write_bundle(dir: &Path, metadata: &ModelMetadata) -> std::path::PathBuf {
        let weights = untrained_weights::<CpuBackend>(metadata).unwrap();
        save_model_bundle(&dir.join("book_classifier"), metadata, &weights).unwrap()
    }

    #[test]
    fn test_load_and_predict_probabilities() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), &small_metadata());

        let engine = InferenceEngine::<CpuBackend>::load(&path).unwrap();
        assert_eq!(engine.num_classes(), 3);
        assert_eq!(engine.input_shape(), [1, 64, 64, 3]);

        let probs = engine.predict(&InputTensor::zeros([1, 64, 64, 3])).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_default_size_model_accepts_224_input() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ModelMetadata::with_default_labels(16);
        let path = write_bundle(dir.path(), &metadata);

        let (classifier, config) = load_classifier(&path, DeviceType::Cpu).unwrap();
        assert_eq!(config.class_labels, metadata.class_labels);
        assert_eq!(config.model_input_size, 224);
        let probs = classifier
            .predict(&InputTensor::zeros([1, 224, 224, 3]))
            .unwrap();
        assert_eq!(probs.len(), 3);
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), &small_metadata());
        let engine = InferenceEngine::<CpuBackend>::load(&path).unwrap();

        let result = engine.predict(&InputTensor::zeros([1, 32, 32, 3]));
        assert!(matches!(result, Err(PipelineError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_missing_bundle_is_asset_load_error() {
        let result = InferenceEngine::<CpuBackend>::load("/nonexistent/model.tar.gz");
        assert!(matches!(result, Err(PipelineError::AssetLoad(_))));
    }

    #[test]
    fn test_invalid_topology_is_asset_load_error() {
        let mut metadata = small_metadata();
        metadata.input_channels = 4;
        let result = InferenceEngine::<CpuBackend>::from_parts(&metadata, Vec::new());
        assert!(matches!(result, Err(PipelineError::AssetLoad(_))));
    }
}
