//! 認識パイプラインのエラー定義

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// 認識パイプラインの各ステージで発生するエラー
///
/// 信頼度不足はエラーではなく [`crate::recognition::Decision::LowConfidence`] で表す。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// カメラへのアクセスが拒否された
    #[error("カメラへのアクセスが拒否されました")]
    PermissionDenied,

    /// モデルアセット（トポロジー/重み）の読み込み失敗
    #[error("モデルアセットの読み込みに失敗しました: {0}")]
    AssetLoad(String),

    /// 画像バイト列のデコード失敗
    #[error("画像のデコードに失敗しました: {0}")]
    Decode(String),

    /// 入力テンソルまたは出力ベクトルの形状不一致
    #[error("テンソル形状が一致しません: 期待 {expected:?}, 実際 {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// 別の認識処理が実行中
    #[error("認識処理が既に実行中です")]
    Busy,

    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),

    /// バックグラウンドタスクの異常終了
    #[error("タスク実行エラー: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}
