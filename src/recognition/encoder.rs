//! base64 JPEG をモデル入力テンソルへ変換

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::ImageFormat;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{InputTensor, MODEL_INPUT_CHANNELS, MODEL_INPUT_SIZE};

/// base64 JPEG をデコードし、`[1, size, size, 3]` の [0, 1] テンソルにする
///
/// 入力画像の大きさに関わらず出力形状は一定。
pub fn encode_jpeg_base64(jpeg_base64: &str, size: u32) -> PipelineResult<InputTensor> {
    let bytes = general_purpose::STANDARD
        .decode(jpeg_base64.trim())
        .map_err(|e| PipelineError::Decode(format!("base64 デコードに失敗: {}", e)))?;
    encode_jpeg_bytes(&bytes, size)
}

/// JPEG バイト列からテンソルを作る
pub fn encode_jpeg_bytes(bytes: &[u8], size: u32) -> PipelineResult<InputTensor> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| PipelineError::Decode(format!("JPEG ではありません: {}", e)))?;
    Ok(encode_image(&image.to_rgb8(), size))
}

/// RGB 画像をバイリニア補間でリサイズして正規化
pub fn encode_image(rgb: &image::RgbImage, size: u32) -> InputTensor {
    let resized = if rgb.dimensions() == (size, size) {
        rgb.clone()
    } else {
        image::imageops::resize(rgb, size, size, FilterType::Triangle)
    };

    // HWC 順なので raw バッファをそのまま正規化すればよい
    let data: Vec<f32> = resized
        .as_raw()
        .iter()
        .map(|&v| v as f32 / 255.0)
        .collect();

    InputTensor {
        data,
        shape: [1, size as usize, size as usize, MODEL_INPUT_CHANNELS],
    }
}

/// 既定解像度（224x224）で変換
pub fn encode_for_model(jpeg_base64: &str) -> PipelineResult<InputTensor> {
    encode_jpeg_base64(jpeg_base64, MODEL_INPUT_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::geometry::{manipulate, SaveFormat, SaveOptions};
    use image::{DynamicImage, Rgb, RgbImage};

    fn encoded(width: u32, height: u32, format: SaveFormat) -> String {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 255])
        });
        manipulate(
            DynamicImage::ImageRgb8(img),
            &[],
            SaveOptions { compress: 0.8, format, base64: true },
        )
        .unwrap()
        .base64
        .unwrap()
    }

    #[test]
    fn test_shape_is_fixed_for_any_input_size() {
        for (w, h) in [(16, 16), (640, 480), (224, 224), (50, 300)] {
            let tensor = encode_for_model(&encoded(w, h, SaveFormat::Jpeg)).unwrap();
            assert_eq!(tensor.shape, [1, 224, 224, 3]);
            assert_eq!(tensor.len(), 224 * 224 * 3);
        }
    }

    #[test]
    fn test_values_are_in_unit_range() {
        let tensor = encode_for_model(&encoded(300, 200, SaveFormat::Jpeg)).unwrap();
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rejects_png_bytes() {
        let result = encode_for_model(&encoded(32, 32, SaveFormat::Png));
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_rejects_malformed_base64() {
        let result = encode_for_model("not base64 at all!!");
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }
}
