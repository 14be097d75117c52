//! 確率ベクトルからラベルを決定する

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// 既定の信頼度しきい値
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// 判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// しきい値以上の確率で分類できた
    Label {
        index: usize,
        label: String,
        confidence: f32,
    },
    /// 最大確率がしきい値未満
    LowConfidence { confidence: f32 },
}

impl Decision {
    pub fn label(&self) -> Option<&str> {
        match self {
            Decision::Label { label, .. } => Some(label),
            Decision::LowConfidence { .. } => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Decision::Label { confidence, .. } | Decision::LowConfidence { confidence } => {
                *confidence
            }
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Label {
                label, confidence, ..
            } => write!(f, "{} ({:.1}%)", label, confidence * 100.0),
            Decision::LowConfidence { confidence } => {
                write!(f, "判定不能 ({:.1}%)", confidence * 100.0)
            }
        }
    }
}

/// 最大確率のインデックスと値を返す
///
/// 同値の場合は小さいインデックスを優先する。NaN は選ばれない。
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, max)) if p > max => best = Some((i, p)),
            None if !p.is_nan() => best = Some((i, p)),
            _ => {}
        }
    }
    best
}

/// 確率ベクトルとラベル表から判定する
pub fn decide(
    probabilities: &[f32],
    labels: &[String],
    threshold: f32,
) -> PipelineResult<Decision> {
    if probabilities.is_empty() || probabilities.len() > labels.len() {
        return Err(PipelineError::ShapeMismatch {
            expected: vec![labels.len()],
            actual: vec![probabilities.len()],
        });
    }

    let Some((index, confidence)) = argmax(probabilities) else {
        // 全要素 NaN
        return Ok(Decision::LowConfidence { confidence: 0.0 });
    };

    if confidence >= threshold {
        Ok(Decision::Label {
            index,
            label: labels[index].clone(),
            confidence,
        })
    } else {
        Ok(Decision::LowConfidence { confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["textbook".into(), "novel".into(), "comic".into()]
    }

    #[test]
    fn test_picks_max_above_threshold() {
        let d = decide(&[0.2, 0.7, 0.1], &labels(), 0.5).unwrap();
        assert_eq!(d.label(), Some("novel"));
        assert!(matches!(d, Decision::Label { index: 1, .. }));
    }

    #[test]
    fn test_low_confidence_below_threshold() {
        let d = decide(&[0.3, 0.3, 0.4], &labels(), 0.5).unwrap();
        assert_eq!(d, Decision::LowConfidence { confidence: 0.4 });
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let d = decide(&[0.5, 0.5, 0.0], &labels(), 0.5).unwrap();
        assert!(matches!(d, Decision::Label { index: 0, .. }));
        assert_eq!(d.label(), Some("textbook"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let d = decide(&[0.1, 0.4, 0.5], &labels(), 0.5).unwrap();
        assert_eq!(d.label(), Some("comic"));
    }

    #[test]
    fn test_nan_is_never_selected() {
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some((1, 0.2)));
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_rejects_empty_and_oversized_vectors() {
        assert!(matches!(
            decide(&[], &labels(), 0.5),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            decide(&[0.1, 0.1, 0.1, 0.7], &labels(), 0.5),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
