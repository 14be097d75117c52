//! 撮影画像の切り出しとリサイズ
//!
//! 撮影ガイド（マスク）の大きさと端末の表示サイズの比率から、画像中央の
//! 切り出し範囲を求めてモデル入力解像度へ縮小する。

use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{CapturedFrame, CropRect, DisplaySize, MODEL_INPUT_SIZE};

/// 画像操作
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageAction {
    Crop(CropRect),
    Resize { width: u32, height: u32 },
}

/// 保存形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    Jpeg,
    Png,
}

/// 保存オプション
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SaveOptions {
    /// 圧縮率 0.0〜1.0（1.0 で最高画質、JPEG のみ有効）
    pub compress: f32,
    pub format: SaveFormat,
    /// base64 文字列も返すか
    pub base64: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compress: 1.0,
            format: SaveFormat::Jpeg,
            base64: true,
        }
    }
}

/// 画像操作の結果
#[derive(Debug, Clone)]
pub struct ManipulatedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub base64: Option<String>,
}

/// 中央切り出し矩形を計算
///
/// 切り出しサイズは画像サイズにマスク/表示サイズの比率を掛けたもの。
/// 画像範囲を超える場合は画像サイズに切り詰める。
pub fn centered_crop(
    image_width: u32,
    image_height: u32,
    mask: DisplaySize,
    display: DisplaySize,
) -> PipelineResult<CropRect> {
    if image_width == 0 || image_height == 0 {
        return Err(PipelineError::Decode(format!(
            "画像サイズが不正です: {}x{}",
            image_width, image_height
        )));
    }
    if !(mask.width > 0.0 && mask.height > 0.0 && display.width > 0.0 && display.height > 0.0) {
        return Err(PipelineError::Decode(format!(
            "マスクまたは表示サイズが不正です: mask={}x{}, display={}x{}",
            mask.width, mask.height, display.width, display.height
        )));
    }

    let scale = |dim: u32, target: f64, screen: f64| -> u32 {
        let scaled = (dim as f64 * target / screen).round();
        (scaled as u32).clamp(1, dim)
    };

    let width = scale(image_width, mask.width, display.width);
    let height = scale(image_height, mask.height, display.height);

    Ok(CropRect {
        origin_x: (image_width - width) / 2,
        origin_y: (image_height - height) / 2,
        width,
        height,
    })
}

/// 画像に操作を順に適用し、指定形式でエンコードする
pub fn manipulate(
    image: DynamicImage,
    actions: &[ImageAction],
    options: SaveOptions,
) -> PipelineResult<ManipulatedImage> {
    let mut image = image;
    for action in actions {
        image = match *action {
            ImageAction::Crop(rect) => {
                let rect = clamp_rect(rect, image.width(), image.height());
                image.crop_imm(rect.origin_x, rect.origin_y, rect.width, rect.height)
            }
            ImageAction::Resize { width, height } => {
                image.resize_exact(width.max(1), height.max(1), FilterType::Triangle)
            }
        };
    }

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut bytes = Vec::new();

    match options.format {
        SaveFormat::Jpeg => {
            let quality = (options.compress.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
            encoder
                .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .map_err(|e| PipelineError::Decode(format!("JPEG エンコードに失敗: {}", e)))?;
        }
        SaveFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
            encoder
                .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .map_err(|e| PipelineError::Decode(format!("PNG エンコードに失敗: {}", e)))?;
        }
    }

    let base64 = options
        .base64
        .then(|| general_purpose::STANDARD.encode(&bytes));

    Ok(ManipulatedImage {
        width,
        height,
        bytes,
        base64,
    })
}

/// 撮影フレームを切り出し・リサイズしてモデル入力用 JPEG を作る
pub fn normalize_frame(
    frame: &CapturedFrame,
    mask: DisplaySize,
    display: DisplaySize,
    compress: f32,
) -> PipelineResult<ManipulatedImage> {
    let image = load_frame_image(frame)?;
    // 報告値ではなく実画素サイズを使う
    let (width, height) = (image.width(), image.height());
    if (width, height) != (frame.width, frame.height) {
        debug!(
            reported = %format!("{}x{}", frame.width, frame.height),
            actual = %format!("{}x{}", width, height),
            "撮影サイズと実画素サイズが異なります"
        );
    }

    let rect = centered_crop(width, height, mask, display)?;
    debug!(?rect, "切り出し範囲");

    manipulate(
        image,
        &[
            ImageAction::Crop(rect),
            ImageAction::Resize {
                width: MODEL_INPUT_SIZE,
                height: MODEL_INPUT_SIZE,
            },
        ],
        SaveOptions {
            compress,
            format: SaveFormat::Jpeg,
            base64: true,
        },
    )
}

/// フレームの画像を読み込む（base64 優先、なければ URI のファイル）
fn load_frame_image(frame: &CapturedFrame) -> PipelineResult<DynamicImage> {
    let bytes = match &frame.base64 {
        Some(b64) => general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| PipelineError::Decode(format!("base64 デコードに失敗: {}", e)))?,
        None => std::fs::read(uri_to_path(&frame.uri)?)?,
    };

    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))
}

fn uri_to_path(uri: &str) -> PipelineResult<PathBuf> {
    match url::Url::parse(uri) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map_err(|_| PipelineError::Decode(format!("ファイル URI が不正です: {}", uri))),
        _ => Ok(PathBuf::from(uri)),
    }
}

fn clamp_rect(rect: CropRect, width: u32, height: u32) -> CropRect {
    let origin_x = rect.origin_x.min(width.saturating_sub(1));
    let origin_y = rect.origin_y.min(height.saturating_sub(1));
    CropRect {
        origin_x,
        origin_y,
        width: rect.width.clamp(1, width - origin_x),
        height: rect.height.clamp(1, height - origin_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn jpeg_frame(width: u32, height: u32) -> CapturedFrame {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let out = manipulate(DynamicImage::ImageRgb8(img), &[], SaveOptions::default()).unwrap();
        CapturedFrame {
            uri: "memory://test".to_string(),
            width,
            height,
            base64: out.base64,
        }
    }

    #[test]
    fn test_crop_is_centered() {
        let rect = centered_crop(
            1080,
            1920,
            DisplaySize::new(300.0, 300.0),
            DisplaySize::new(390.0, 844.0),
        )
        .unwrap();
        assert_eq!(rect.width, (1080.0_f64 * 300.0 / 390.0).round() as u32);
        assert_eq!(rect.height, (1920.0_f64 * 300.0 / 844.0).round() as u32);
        assert_eq!(rect.origin_x, (1080 - rect.width) / 2);
        assert_eq!(rect.origin_y, (1920 - rect.height) / 2);
    }

    #[test]
    fn test_crop_clamps_to_image_bounds() {
        let rect = centered_crop(
            640,
            480,
            DisplaySize::new(800.0, 900.0),
            DisplaySize::new(400.0, 300.0),
        )
        .unwrap();
        assert_eq!(rect, CropRect { origin_x: 0, origin_y: 0, width: 640, height: 480 });
    }

    #[test]
    fn test_crop_rejects_zero_display() {
        let result = centered_crop(
            640,
            480,
            DisplaySize::new(100.0, 100.0),
            DisplaySize::new(0.0, 300.0),
        );
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_normalize_frame_outputs_model_size_jpeg() {
        let frame = jpeg_frame(320, 240);
        let out = normalize_frame(
            &frame,
            DisplaySize::new(200.0, 200.0),
            DisplaySize::new(400.0, 400.0),
            0.9,
        )
        .unwrap();
        assert_eq!((out.width, out.height), (MODEL_INPUT_SIZE, MODEL_INPUT_SIZE));
        // JPEG SOI マーカー
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
        assert!(out.base64.is_some());
    }

    #[test]
    fn test_normalize_frame_reads_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        RgbImage::from_pixel(64, 48, Rgb([10, 20, 30])).save(&path).unwrap();
        let uri = url::Url::from_file_path(&path).unwrap().to_string();
        let frame = CapturedFrame { uri, width: 64, height: 48, base64: None };

        let out = normalize_frame(
            &frame,
            DisplaySize::new(1.0, 1.0),
            DisplaySize::new(2.0, 2.0),
            1.0,
        )
        .unwrap();
        assert_eq!(out.width, MODEL_INPUT_SIZE);
    }

    #[test]
    fn test_manipulate_applies_actions_in_order() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        let out = manipulate(
            img,
            &[
                ImageAction::Crop(CropRect { origin_x: 10, origin_y: 0, width: 40, height: 40 }),
                ImageAction::Resize { width: 20, height: 10 },
            ],
            SaveOptions { compress: 0.5, format: SaveFormat::Png, base64: false },
        )
        .unwrap();
        assert_eq!((out.width, out.height), (20, 10));
        assert!(out.base64.is_none());
        assert_eq!(&out.bytes[1..4], b"PNG");
    }
}
