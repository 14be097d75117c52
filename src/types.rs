use serde::{Deserialize, Serialize};

/// モデル入力解像度（正方形）
pub const MODEL_INPUT_SIZE: u32 = 224;

/// モデル入力チャネル数（RGB）
pub const MODEL_INPUT_CHANNELS: usize = 3;

/// カメラから取得した1枚の画像
///
/// 撮影ごとに生成され、パイプラインで一度だけ消費される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    /// 撮影画像のエンコード済みバイト列（base64）
    #[serde(default)]
    pub base64: Option<String>,
}

/// 切り出し矩形（画像ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

/// 表示領域またはマスクの大きさ（表示座標系）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// 正規化済み入力テンソル
///
/// NHWC 順 `[1, H, W, 3]` で平坦化、値域は [0, 1]。
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
}

impl InputTensor {
    /// 値がすべて0のテンソル
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            data: vec![0.0; shape.iter().product()],
            shape,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 認識機能の状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RecognitionPhase {
    Idle,
    Capturing,
    Processing,
    Result { decision: crate::recognition::Decision },
}

impl RecognitionPhase {
    /// 撮影または処理の途中か
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RecognitionPhase::Capturing | RecognitionPhase::Processing)
    }
}

impl std::fmt::Display for RecognitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionPhase::Idle => write!(f, "Idle"),
            RecognitionPhase::Capturing => write!(f, "Capturing"),
            RecognitionPhase::Processing => write!(f, "Processing"),
            RecognitionPhase::Result { decision } => write!(f, "Result({})", decision),
        }
    }
}
