//! モデルメタデータから推論用情報を取得

use crate::model::model_metadata::ModelMetadata;

/// 推論に必要な情報
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// クラスラベル（出力インデックス順）
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub model_input_size: u32,

    /// 入力チャネル数
    pub input_channels: u32,

    /// 全結合層の隠れ次元
    pub hidden_size: usize,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            model_input_size: metadata.input_size,
            input_channels: metadata.input_channels,
            hidden_size: metadata.hidden_size,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// 期待する入力形状 `[1, H, W, C]`
    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.model_input_size as usize;
        [1, size, size, self.input_channels as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_metadata() {
        let mut metadata = ModelMetadata::with_default_labels(8);
        metadata.input_size = 96;
        let config = InferenceConfig::from_metadata(&metadata);
        assert_eq!(config.num_classes(), 3);
        assert_eq!(config.input_shape(), [1, 96, 96, 3]);
        assert_eq!(config.class_labels[1], "novel");
        assert_eq!(config.hidden_size, 8);
    }
}
