//! 一括認識の結果をCSVで読み書きする

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::recognition::Decision;

/// 1画像分の結果行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub file: String,
    /// 判定不能・エラー時は空
    pub label: String,
    pub confidence: f32,
    /// `ok` / `low_confidence` / `error`
    pub status: String,
    pub error: String,
}

impl BatchRow {
    pub fn from_decision(file: &Path, decision: &Decision) -> Self {
        let (label, status) = match decision.label() {
            Some(label) => (label.to_string(), "ok"),
            None => (String::new(), "low_confidence"),
        };
        Self {
            file: file.display().to_string(),
            label,
            confidence: decision.confidence(),
            status: status.to_string(),
            error: String::new(),
        }
    }

    pub fn from_error(file: &Path, error: impl std::fmt::Display) -> Self {
        Self {
            file: file.display().to_string(),
            label: String::new(),
            confidence: 0.0,
            status: "error".to_string(),
            error: error.to_string(),
        }
    }
}

/// ラベルごとの件数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub class_name: String,
    pub count: usize,
}

/// ディレクトリ内の画像ファイルを名前順に列挙
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("ディレクトリを読み込めません: {}", dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

pub fn write_report(path: &Path, rows: &[BatchRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("CSV作成エラー: {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_report(path: &Path) -> Result<Vec<BatchRow>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

/// 判定できた行をラベルごとに集計（ラベル名順）
pub fn summarize(rows: &[BatchRow]) -> Vec<ClassSummary> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.status == "ok") {
        *counts.entry(row.label.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(class_name, count)| ClassSummary {
            class_name: class_name.to_string(),
            count,
        })
        .collect()
}
