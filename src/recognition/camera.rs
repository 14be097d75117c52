//! 画像取得（カメラ）

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::types::CapturedFrame;

/// カメラ権限の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPermission {
    #[default]
    Granted,
    Denied,
}

/// 撮影ソース
///
/// 撮影はブロッキング処理としてバックグラウンドスレッドで呼ばれる。
pub trait Camera: Send + Sync {
    fn capture(&self) -> PipelineResult<CapturedFrame>;
}

/// 静止画ファイルを撮影結果として返すカメラ
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
    permission: CameraPermission,
}

impl FileCamera {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            permission: CameraPermission::Granted,
        }
    }

    pub fn with_permission(mut self, permission: CameraPermission) -> Self {
        self.permission = permission;
        self
    }
}

impl Camera for FileCamera {
    fn capture(&self) -> PipelineResult<CapturedFrame> {
        if self.permission == CameraPermission::Denied {
            warn!("カメラ権限がありません");
            return Err(PipelineError::PermissionDenied);
        }

        let absolute = std::fs::canonicalize(&self.path)?;
        let bytes = std::fs::read(&absolute)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| PipelineError::Decode(format!("{}: {}", absolute.display(), e)))?;

        let uri = url::Url::from_file_path(&absolute)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| absolute.to_string_lossy().to_string());

        info!(uri = %uri, width = image.width(), height = image.height(), "撮影しました");

        Ok(CapturedFrame {
            uri,
            width: image.width(),
            height: image.height(),
            base64: Some(general_purpose::STANDARD.encode(&bytes)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_file_camera_reports_size_and_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        RgbImage::from_pixel(40, 30, Rgb([1, 2, 3])).save(&path).unwrap();

        let frame = FileCamera::new(&path).capture().unwrap();
        assert_eq!((frame.width, frame.height), (40, 30));
        assert!(frame.uri.starts_with("file://"));
        assert!(frame.base64.is_some());
    }

    #[test]
    fn test_denied_permission() {
        let camera = FileCamera::new("does-not-matter.jpg").with_permission(CameraPermission::Denied);
        assert!(matches!(camera.capture(), Err(PipelineError::PermissionDenied)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let camera = FileCamera::new("/nonexistent/cover.jpg");
        assert!(matches!(camera.capture(), Err(PipelineError::Io(_))));
    }
}
