//! モデルバンドルの永続化
//!
//! Tar.gz形式でトポロジーと重みを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - model.json   - トポロジー（クラスラベル、入力サイズなど）
//! - weights.bin  - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

/// トポロジーのエントリ名
pub const TOPOLOGY_ENTRY: &str = "model.json";

/// 重みのエントリ名
pub const WEIGHTS_ENTRY: &str = "weights.bin";

/// 出力パスを .tar.gz に揃える
pub fn bundle_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// トポロジーと重みをTar.gz形式で保存
///
/// 保存先のパスを返す。
pub fn save_model_bundle(
    output_path: &Path,
    metadata: &ModelMetadata,
    weights: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = bundle_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, TOPOLOGY_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, WEIGHTS_ENTRY, weights)?;

    // gzip ストリームまで閉じる
    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// 指定エントリを探して読み込む
fn read_entry(tar_gz_path: &Path, name: &str) -> Result<Vec<u8>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(name) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive", name))
}

/// Tar.gzからトポロジーを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let bytes = read_entry(tar_gz_path, TOPOLOGY_ENTRY)?;
    let json_str = String::from_utf8(bytes).context("model.json is not valid UTF-8")?;
    ModelMetadata::from_json_string(&json_str)
}

/// Tar.gzから重みを読み込む
pub fn load_weights(tar_gz_path: &Path) -> Result<Vec<u8>> {
    read_entry(tar_gz_path, WEIGHTS_ENTRY)
}

/// トポロジーと重みを共に読み込む
pub fn load_model_bundle(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut weights_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();

        match path.as_str() {
            TOPOLOGY_ENTRY => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            WEIGHTS_ENTRY => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                weights_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, weights_opt) {
        (Some(metadata), Some(weights)) => Ok((metadata, weights)),
        (None, _) => Err(anyhow::anyhow!("{} not found in tar.gz archive", TOPOLOGY_ENTRY)),
        (_, None) => Err(anyhow::anyhow!("{} not found in tar.gz archive", WEIGHTS_ENTRY)),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("形式バージョン: v{}", metadata.format_version);
    println!("クラスラベル: {}", metadata.class_labels.join(", "));
    println!("クラス数: {}", metadata.num_classes());
    println!(
        "モデル入力: {}x{}x{}",
        metadata.input_size, metadata.input_size, metadata.input_channels
    );
    println!("隠れ次元: {}", metadata.hidden_size);
    println!("作成日時: {}", metadata.created_at);
    println!("========================");
}
