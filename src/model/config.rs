//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデルパス、撮影ガイド、判定しきい値などをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::recognition::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::types::DisplaySize;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルバンドル（tar.gz）のパス
    pub model_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/book_classifier.tar.gz".to_string(),
        }
    }
}

/// 撮影ガイド設定
///
/// 切り出しサイズは「画像サイズ × ガイドサイズ / 表示サイズ」で求める。
/// 表示サイズは論理座標のまま扱い、デバイスピクセル比は考慮しない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// 端末の表示幅（論理座標）
    pub display_width: f64,
    /// 端末の表示高さ（論理座標）
    pub display_height: f64,
    /// 撮影ガイド（マスク）の幅
    pub mask_width: f64,
    /// 撮影ガイド（マスク）の高さ
    pub mask_height: f64,
    /// 切り出し画像の JPEG 圧縮率 (0.0〜1.0)
    #[serde(default = "default_compress")]
    pub compress: f32,
}

fn default_compress() -> f32 {
    1.0
}

impl CaptureSettings {
    pub fn mask_size(&self) -> DisplaySize {
        DisplaySize::new(self.mask_width, self.mask_height)
    }

    pub fn display_size(&self) -> DisplaySize {
        DisplaySize::new(self.display_width, self.display_height)
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            display_width: 390.0,
            display_height: 844.0,
            mask_width: 300.0,
            mask_height: 300.0,
            compress: default_compress(),
        }
    }
}

/// 判定設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSettings {
    /// この確率未満は「判定不能」
    pub confidence_threshold: f32,
}

impl DecisionSettings {
    /// しきい値が 0.0〜1.0 の範囲か検証（NaN も不可）
    pub fn validate_threshold(threshold: f32) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("しきい値は 0.0〜1.0 で指定してください: {}", threshold);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_threshold(self.confidence_threshold)
    }
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// 撮影ガイド設定
    #[serde(default)]
    pub capture: CaptureSettings,
    /// 判定設定
    #[serde(default)]
    pub decision: DecisionSettings,
    /// ドキュメントストアのスナップショットファイル
    #[serde(default)]
    pub store_path: Option<String>,
    /// 最後に認識した画像のパス
    #[serde(default)]
    pub last_image_path: Option<String>,
}

impl AppConfig {
    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.decision.validate()?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 最後に認識した画像のパスを更新
    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("モデルパス: {}", self.model.model_path);
        println!("\n--- 撮影ガイド ---");
        println!(
            "表示サイズ: {}x{}",
            self.capture.display_width, self.capture.display_height
        );
        println!(
            "ガイドサイズ: {}x{}",
            self.capture.mask_width, self.capture.mask_height
        );
        println!("JPEG 圧縮率: {}", self.capture.compress);
        println!("\n--- 判定 ---");
        println!("信頼度しきい値: {}", self.decision.confidence_threshold);

        if let Some(ref store) = self.store_path {
            println!("\nストア: {}", store);
        }
        if let Some(ref image) = self.last_image_path {
            println!("最後に認識した画像: {}", image);
        }
        println!("========================\n");
    }
}
