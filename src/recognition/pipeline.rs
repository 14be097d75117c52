//! 認識処理の状態管理と実行
//!
//! 状態遷移: `Idle → Capturing → Processing → Result → Idle`
//!
//! - 実行中に再度 `run` された場合は `Busy` で拒否する
//! - 実行中に閉じられても処理は最後まで行い、結果スロットを更新する
//! - どのステージで失敗しても `Idle` に戻り、再試行は行わない

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::model::AppConfig;
use crate::recognition::{decide, encode_jpeg_base64, normalize_frame, Camera, Classifier, Decision};
use crate::types::{DisplaySize, RecognitionPhase};

/// パイプラインの実行設定
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// 撮影ガイドの大きさ（表示座標）
    pub mask: DisplaySize,
    /// 端末の表示サイズ
    pub display: DisplaySize,
    /// 切り出し画像の JPEG 圧縮率
    pub compress: f32,
    pub confidence_threshold: f32,
    /// クラスインデックス順のラベル表
    pub labels: Vec<String>,
    pub input_size: u32,
}

impl PipelineSettings {
    /// アプリ設定とモデルのラベル表・入力サイズから作成
    pub fn from_config(config: &AppConfig, labels: Vec<String>, input_size: u32) -> Self {
        Self {
            mask: config.capture.mask_size(),
            display: config.capture.display_size(),
            compress: config.capture.compress,
            confidence_threshold: config.decision.confidence_threshold,
            labels,
            input_size,
        }
    }
}

#[derive(Debug)]
struct PipelineState {
    phase: RecognitionPhase,
    /// 実行中に閉じられたか
    dismissed: bool,
    last_result: Option<Decision>,
    last_error: Option<String>,
}

/// 書籍認識パイプライン
pub struct RecognitionPipeline {
    camera: Arc<dyn Camera>,
    classifier: Arc<dyn Classifier>,
    settings: PipelineSettings,
    state: Mutex<PipelineState>,
}

impl RecognitionPipeline {
    pub fn new(
        camera: Arc<dyn Camera>,
        classifier: Arc<dyn Classifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            camera,
            classifier,
            settings,
            state: Mutex::new(PipelineState {
                phase: RecognitionPhase::Idle,
                dismissed: false,
                last_result: None,
                last_error: None,
            }),
        }
    }

    pub fn phase(&self) -> RecognitionPhase {
        self.state.lock().phase.clone()
    }

    /// 最後に完了した判定（閉じられた後の結果も含む）
    pub fn last_result(&self) -> Option<Decision> {
        self.state.lock().last_result.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// 結果ダイアログを閉じる
    ///
    /// 処理中の場合は中断せず、完了時に `Idle` へ戻るよう記録するだけ。
    pub fn dismiss(&self) {
        let mut state = self.state.lock();
        match state.phase {
            RecognitionPhase::Result { .. } => state.phase = RecognitionPhase::Idle,
            RecognitionPhase::Capturing | RecognitionPhase::Processing => state.dismissed = true,
            RecognitionPhase::Idle => {}
        }
    }

    /// 撮影から判定までを1回実行
    pub async fn run(&self) -> PipelineResult<Decision> {
        let guard = self.begin()?;
        match self.run_stages().await {
            Ok(decision) => {
                info!(%decision, "認識完了");
                guard.complete(decision.clone());
                Ok(decision)
            }
            Err(e) => {
                warn!(error = %e, "認識に失敗しました");
                guard.fail(&e);
                Err(e)
            }
        }
    }

    fn begin(&self) -> PipelineResult<RunGuard<'_>> {
        let mut state = self.state.lock();
        if state.phase.is_in_flight() {
            return Err(PipelineError::Busy);
        }
        state.phase = RecognitionPhase::Capturing;
        state.dismissed = false;
        state.last_error = None;
        Ok(RunGuard {
            state: &self.state,
            finished: false,
        })
    }

    async fn run_stages(&self) -> PipelineResult<Decision> {
        let camera = Arc::clone(&self.camera);
        let frame = tokio::task::spawn_blocking(move || camera.capture()).await??;

        self.state.lock().phase = RecognitionPhase::Processing;

        let settings = self.settings.clone();
        let tensor = tokio::task::spawn_blocking(move || {
            let cropped = normalize_frame(&frame, settings.mask, settings.display, settings.compress)?;
            let jpeg = cropped
                .base64
                .ok_or_else(|| PipelineError::Decode("切り出し画像の base64 がありません".to_string()))?;
            encode_jpeg_base64(&jpeg, settings.input_size)
        })
        .await??;

        let classifier = Arc::clone(&self.classifier);
        let probabilities = tokio::task::spawn_blocking(move || classifier.predict(&tensor)).await??;

        decide(
            &probabilities,
            &self.settings.labels,
            self.settings.confidence_threshold,
        )
    }
}

/// 実行中の1回分を表すガード
///
/// 完了・失敗を通知せずに破棄された場合も `Idle` へ戻す。
struct RunGuard<'a> {
    state: &'a Mutex<PipelineState>,
    finished: bool,
}

impl RunGuard<'_> {
    fn complete(mut self, decision: Decision) {
        let mut state = self.state.lock();
        state.last_result = Some(decision.clone());
        state.phase = if state.dismissed {
            RecognitionPhase::Idle
        } else {
            RecognitionPhase::Result { decision }
        };
        state.dismissed = false;
        self.finished = true;
    }

    fn fail(mut self, error: &PipelineError) {
        let mut state = self.state.lock();
        state.last_error = Some(error.to_string());
        state.phase = RecognitionPhase::Idle;
        state.dismissed = false;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.state.lock();
            state.phase = RecognitionPhase::Idle;
            state.dismissed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::geometry::{manipulate, SaveOptions};
    use crate::types::{CapturedFrame, InputTensor, MODEL_INPUT_SIZE};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_frame() -> CapturedFrame {
        let img = RgbImage::from_pixel(120, 160, Rgb([200, 180, 40]));
        let out = manipulate(DynamicImage::ImageRgb8(img), &[], SaveOptions::default()).unwrap();
        CapturedFrame {
            uri: "memory://sample".to_string(),
            width: 120,
            height: 160,
            base64: out.base64,
        }
    }

    /// 指定回数だけ権限エラーを返すカメラ
    struct TestCamera {
        deny_first: usize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl TestCamera {
        fn ok() -> Self {
            Self { deny_first: 0, calls: AtomicUsize::new(0), delay: Duration::ZERO }
        }
    }

    impl Camera for TestCamera {
        fn capture(&self) -> PipelineResult<CapturedFrame> {
            std::thread::sleep(self.delay);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.deny_first {
                return Err(PipelineError::PermissionDenied);
            }
            Ok(sample_frame())
        }
    }

    struct FixedClassifier {
        probabilities: Vec<f32>,
        delay: Duration,
    }

    impl Classifier for FixedClassifier {
        fn input_shape(&self) -> [usize; 4] {
            [1, 224, 224, 3]
        }

        fn num_classes(&self) -> usize {
            self.probabilities.len()
        }

        fn predict(&self, input: &InputTensor) -> PipelineResult<Vec<f32>> {
            if input.shape != self.input_shape() {
                return Err(PipelineError::ShapeMismatch {
                    expected: self.input_shape().to_vec(),
                    actual: input.shape.to_vec(),
                });
            }
            std::thread::sleep(self.delay);
            Ok(self.probabilities.clone())
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            mask: DisplaySize::new(300.0, 300.0),
            display: DisplaySize::new(390.0, 844.0),
            compress: 1.0,
            confidence_threshold: 0.5,
            labels: vec!["textbook".into(), "novel".into(), "comic".into()],
            input_size: MODEL_INPUT_SIZE,
        }
    }

    fn pipeline(camera: TestCamera, probabilities: Vec<f32>, delay: Duration) -> RecognitionPipeline {
        RecognitionPipeline::new(
            Arc::new(camera),
            Arc::new(FixedClassifier { probabilities, delay }),
            settings(),
        )
    }

    #[tokio::test]
    async fn test_run_reaches_result_then_dismiss_returns_idle() {
        let p = pipeline(TestCamera::ok(), vec![0.2, 0.7, 0.1], Duration::ZERO);
        assert_eq!(p.phase(), RecognitionPhase::Idle);

        let decision = p.run().await.unwrap();
        assert_eq!(decision.label(), Some("novel"));
        assert!(matches!(p.phase(), RecognitionPhase::Result { .. }));

        p.dismiss();
        assert_eq!(p.phase(), RecognitionPhase::Idle);
        assert_eq!(p.last_result(), Some(decision));
    }

    #[tokio::test]
    async fn test_low_confidence_is_a_result() {
        let p = pipeline(TestCamera::ok(), vec![0.3, 0.3, 0.4], Duration::ZERO);
        let decision = p.run().await.unwrap();
        assert_eq!(decision, Decision::LowConfidence { confidence: 0.4 });
        assert!(p.last_error().is_none());
    }

    #[tokio::test]
    async fn test_second_trigger_while_in_flight_is_rejected() {
        let camera = TestCamera {
            delay: Duration::from_millis(100),
            ..TestCamera::ok()
        };
        let p = pipeline(camera, vec![0.9, 0.05, 0.05], Duration::ZERO);

        let (first, second) = tokio::join!(p.run(), p.run());
        assert!(first.is_ok());
        assert!(matches!(second, Err(PipelineError::Busy)));
    }

    #[tokio::test]
    async fn test_dismiss_mid_flight_still_fills_result_slot() {
        let p = Arc::new(pipeline(
            TestCamera::ok(),
            vec![0.1, 0.1, 0.8],
            Duration::from_millis(200),
        ));

        let runner = {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.run().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(p.phase().is_in_flight());
        p.dismiss();

        let decision = runner.await.unwrap().unwrap();
        assert_eq!(decision.label(), Some("comic"));
        assert_eq!(p.phase(), RecognitionPhase::Idle);
        assert_eq!(p.last_result(), Some(decision));
    }

    #[tokio::test]
    async fn test_failure_resets_to_idle_and_accepts_new_capture() {
        let camera = TestCamera {
            deny_first: 1,
            ..TestCamera::ok()
        };
        let p = pipeline(camera, vec![0.6, 0.3, 0.1], Duration::ZERO);

        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::PermissionDenied));
        assert_eq!(p.phase(), RecognitionPhase::Idle);
        assert!(p.last_error().is_some());

        let decision = p.run().await.unwrap();
        assert_eq!(decision.label(), Some("textbook"));
        assert!(p.last_error().is_none());
    }

    #[tokio::test]
    async fn test_output_longer_than_label_table_fails() {
        let p = pipeline(TestCamera::ok(), vec![0.1, 0.1, 0.1, 0.7], Duration::ZERO);
        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
        assert_eq!(p.phase(), RecognitionPhase::Idle);
    }
}
