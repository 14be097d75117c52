//! モデルメタデータ（トポロジー記述）の定義
//!
//! バンドル内の `model.json` として保存され、重み `weights.bin` と対で読み込まれます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{MODEL_INPUT_CHANNELS, MODEL_INPUT_SIZE};

/// 現在のバンドル形式バージョン
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// 既定のクラスラベル（クラスインデックス順）
pub const DEFAULT_CLASS_LABELS: [&str; 3] = ["textbook", "novel", "comic"];

/// 畳み込み層を通した後に最低限必要な入力サイズ
pub const MIN_INPUT_SIZE: u32 = 30;

/// モデルメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// バンドル形式バージョン
    pub format_version: u32,

    /// クラスラベル（出力インデックス順）
    /// 例: ["textbook", "novel", "comic"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常224）
    pub input_size: u32,

    /// 入力チャネル数（RGB = 3）
    pub input_channels: u32,

    /// 全結合層の隠れ次元
    pub hidden_size: usize,

    /// 作成時刻（ISO8601形式）
    pub created_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_labels: Vec<String>, hidden_size: usize) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            class_labels,
            input_size: MODEL_INPUT_SIZE,
            input_channels: MODEL_INPUT_CHANNELS as u32,
            hidden_size,
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 既定ラベルのメタデータ
    pub fn with_default_labels(hidden_size: usize) -> Self {
        Self::new(
            DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect(),
            hidden_size,
        )
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// 推論に使えるトポロジーか検証
    pub fn validate(&self) -> Result<()> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            anyhow::bail!(
                "未対応のバンドル形式です: v{} (対応: v{})",
                self.format_version,
                BUNDLE_FORMAT_VERSION
            );
        }
        if self.class_labels.is_empty() {
            anyhow::bail!("クラスラベルが空です");
        }
        if self.input_channels != MODEL_INPUT_CHANNELS as u32 {
            anyhow::bail!("入力チャネル数が不正です: {}", self.input_channels);
        }
        if self.input_size < MIN_INPUT_SIZE {
            anyhow::bail!(
                "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
                self.input_size,
                MIN_INPUT_SIZE,
                MIN_INPUT_SIZE
            );
        }
        if self.hidden_size == 0 {
            anyhow::bail!("隠れ次元が0です");
        }
        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels_validate() {
        let metadata = ModelMetadata::with_default_labels(64);
        assert_eq!(metadata.num_classes(), 3);
        assert_eq!(metadata.input_size, 224);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_topology() {
        let mut metadata = ModelMetadata::with_default_labels(64);
        metadata.class_labels.clear();
        assert!(metadata.validate().is_err());

        let mut metadata = ModelMetadata::with_default_labels(64);
        metadata.input_size = 8;
        assert!(metadata.validate().is_err());

        let mut metadata = ModelMetadata::with_default_labels(64);
        metadata.input_channels = 1;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let metadata = ModelMetadata::with_default_labels(32);
        let json = metadata.to_json_string().unwrap();
        assert_eq!(ModelMetadata::from_json_string(&json).unwrap(), metadata);
    }
}
