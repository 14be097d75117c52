//! 認識・モデル関連のコマンド

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::csv_report::{self, BatchRow, ClassSummary};
use crate::model::{load_metadata, print_metadata_info, AppConfig, InferenceConfig};
use crate::recognition::{Camera, Classifier, Decision, FileCamera, PipelineSettings, RecognitionPipeline};

/// 読み込み済みの分類器とラベル表
///
/// プロセス起動時に1回だけ作り、すべての認識処理で共有する。
pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    pub inference: InferenceConfig,
}

impl LoadedModel {
    pub fn settings(&self, config: &AppConfig) -> PipelineSettings {
        PipelineSettings::from_config(
            config,
            self.inference.class_labels.clone(),
            self.inference.model_input_size,
        )
    }

    pub fn pipeline(&self, config: &AppConfig, camera: Arc<dyn Camera>) -> RecognitionPipeline {
        RecognitionPipeline::new(camera, self.classifier.clone(), self.settings(config))
    }
}

/// 設定されたモデルとデバイスで分類器を読み込む
#[cfg(feature = "ml")]
pub fn load_model(config: &AppConfig) -> Result<LoadedModel> {
    let path = PathBuf::from(&config.model.model_path);
    let (classifier, inference) = crate::ml::load_classifier(&path, config.device_type)
        .with_context(|| format!("モデルの読み込みエラー: {}", path.display()))?;
    Ok(LoadedModel {
        classifier,
        inference,
    })
}

#[cfg(not(feature = "ml"))]
pub fn load_model(_config: &AppConfig) -> Result<LoadedModel> {
    anyhow::bail!("機械学習機能が有効化されていません")
}

/// 画像1枚を認識する
pub async fn classify_image(config: &AppConfig, model: &LoadedModel, image: &Path) -> Result<Decision> {
    let pipeline = model.pipeline(config, Arc::new(FileCamera::new(image)));
    let decision = pipeline
        .run()
        .await
        .with_context(|| format!("認識に失敗しました: {}", image.display()))?;
    Ok(decision)
}

/// 一括認識の結果
#[derive(Debug)]
pub struct BatchOutcome {
    pub rows: Vec<BatchRow>,
    pub summary: Vec<ClassSummary>,
    pub message: String,
}

/// ディレクトリ内の画像をすべて認識し、CSVに書き出す
///
/// 1枚ごとに失敗しても処理は続け、エラーは行として記録する。
pub async fn batch_classify(
    config: &AppConfig,
    model: &LoadedModel,
    images_dir: &Path,
    output_csv: &Path,
) -> Result<BatchOutcome> {
    let images = csv_report::collect_images(images_dir)?;
    if images.is_empty() {
        anyhow::bail!("画像が見つかりません: {}", images_dir.display());
    }
    info!(count = images.len(), dir = %images_dir.display(), "一括認識を開始");

    let mut rows = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let pipeline = model.pipeline(config, Arc::new(FileCamera::new(image)));
        let row = match pipeline.run().await {
            Ok(decision) => BatchRow::from_decision(image, &decision),
            Err(e) => {
                warn!(file = %image.display(), error = %e, "認識失敗");
                BatchRow::from_error(image, e)
            }
        };
        if (i + 1) % 10 == 0 {
            info!("{}/{} 枚処理", i + 1, images.len());
        }
        rows.push(row);
    }

    csv_report::write_report(output_csv, &rows)?;
    let summary = csv_report::summarize(&rows);
    let failed = rows.iter().filter(|r| r.status == "error").count();
    let message = format!(
        "{}枚を認識しました（失敗 {}枚）: {}",
        rows.len(),
        failed,
        output_csv.display()
    );
    Ok(BatchOutcome {
        rows,
        summary,
        message,
    })
}

/// ラベル一覧ファイルを解析する
///
/// 1行1ラベル、またはカンマ区切り。空行は無視。
pub fn parse_label_list(content: &str) -> Vec<String> {
    content
        .lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// ランダム初期化したモデルバンドルを書き出す（配線確認用）
#[cfg(feature = "ml")]
pub fn init_model(output: &Path, labels: Vec<String>, hidden_size: usize, input_size: u32) -> Result<PathBuf> {
    use crate::ml::{untrained_weights, CpuBackend};
    use crate::model::{save_model_bundle, ModelMetadata};

    let mut metadata = ModelMetadata::new(labels, hidden_size);
    metadata.input_size = input_size;
    metadata.validate()?;

    let weights = untrained_weights::<CpuBackend>(&metadata)?;
    let path = save_model_bundle(output, &metadata, &weights)?;
    warn!("学習済みではないモデルです。動作確認にのみ使用してください");
    Ok(path)
}

#[cfg(not(feature = "ml"))]
pub fn init_model(_output: &Path, _labels: Vec<String>, _hidden_size: usize, _input_size: u32) -> Result<PathBuf> {
    anyhow::bail!("機械学習機能が有効化されていません")
}

/// ラベル指定を解決する（ファイル指定があればそちらを優先）
pub fn resolve_labels(labels: Option<&str>, labels_file: Option<&Path>) -> Result<Option<Vec<String>>> {
    if let Some(path) = labels_file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("ラベルファイルの読み込みエラー: {}", path.display()))?;
        return Ok(Some(parse_label_list(&content)));
    }
    Ok(labels.map(parse_label_list))
}

pub fn inspect_model(path: &Path) -> Result<()> {
    let metadata = load_metadata(path)?;
    print_metadata_info(&metadata);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineResult;
    use crate::model::ModelMetadata;
    use crate::types::InputTensor;
    use image::{Rgb, RgbImage};

    struct ConstantClassifier(Vec<f32>);

    impl Classifier for ConstantClassifier {
        fn input_shape(&self) -> [usize; 4] {
            [1, 224, 224, 3]
        }
        fn num_classes(&self) -> usize {
            self.0.len()
        }
        fn predict(&self, _input: &InputTensor) -> PipelineResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn model(probabilities: Vec<f32>) -> LoadedModel {
        LoadedModel {
            classifier: Arc::new(ConstantClassifier(probabilities)),
            inference: InferenceConfig::from_metadata(&ModelMetadata::with_default_labels(16)),
        }
    }

    fn write_photo(path: &Path) {
        RgbImage::from_pixel(400, 600, Rgb([120, 80, 40])).save(path).unwrap();
    }

    #[test]
    fn test_parse_label_list() {
        assert_eq!(
            parse_label_list("textbook, novel\n\ncomic\n"),
            vec!["textbook", "novel", "comic"]
        );
        assert!(parse_label_list(" \n").is_empty());
    }

    #[tokio::test]
    async fn test_classify_image() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("cover.png");
        write_photo(&photo);

        let decision = classify_image(&AppConfig::default(), &model(vec![0.1, 0.7, 0.2]), &photo)
            .await
            .unwrap();
        assert_eq!(decision.label(), Some("novel"));
    }

    #[tokio::test]
    async fn test_batch_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        fs::create_dir(&images).unwrap();
        write_photo(&images.join("a.png"));
        fs::write(images.join("b.jpg"), b"not an image").unwrap();
        write_photo(&images.join("c.png"));

        let output = dir.path().join("report.csv");
        let outcome = batch_classify(
            &AppConfig::default(),
            &model(vec![0.05, 0.05, 0.9]),
            &images,
            &output,
        )
        .await
        .unwrap();

        let statuses: Vec<_> = outcome.rows.iter().map(|r| r.status.as_str()).collect();
        assert_eq!(statuses, vec!["ok", "error", "ok"]);
        assert_eq!(outcome.summary[0].class_name, "comic");
        assert_eq!(outcome.summary[0].count, 2);
        assert_eq!(csv_report::load_report(&output).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_empty_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = batch_classify(
            &AppConfig::default(),
            &model(vec![1.0, 0.0, 0.0]),
            dir.path(),
            &dir.path().join("r.csv"),
        )
        .await;
        assert!(result.is_err());
    }
}
