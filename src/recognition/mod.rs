//! 書籍カメラ認識パイプライン
//!
//! 撮影 → 切り出し/リサイズ → テンソル化 → 推論 → 判定 を順に実行する。

pub mod camera;
pub mod decision;
pub mod encoder;
pub mod geometry;
pub mod pipeline;

pub use camera::{Camera, CameraPermission, FileCamera};
pub use decision::{argmax, decide, Decision, DEFAULT_CONFIDENCE_THRESHOLD};
pub use encoder::{encode_for_model, encode_image, encode_jpeg_base64};
pub use geometry::{centered_crop, manipulate, normalize_frame, ImageAction, ManipulatedImage, SaveFormat, SaveOptions};
pub use pipeline::{PipelineSettings, RecognitionPipeline};

use crate::error::PipelineResult;
use crate::types::InputTensor;

/// 学習済み分類モデル
///
/// 読み込み後は不変で、複数の認識処理から共有される。
pub trait Classifier: Send + Sync {
    /// 期待する入力形状 `[1, H, W, C]`
    fn input_shape(&self) -> [usize; 4];

    /// クラス数（出力ベクトル長）
    fn num_classes(&self) -> usize;

    /// 確率ベクトルを返す
    fn predict(&self, input: &InputTensor) -> PipelineResult<Vec<f32>>;
}
