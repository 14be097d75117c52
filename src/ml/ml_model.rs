//! 機械学習モデルの共通定義
//!
//! 書籍分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use tracing::debug;

/// 全結合層の前に揃える特徴マップサイズ
const POOLED_SIZE: usize = 4;

/// 最終畳み込み層のチャネル数
const FEATURE_CHANNELS: usize = 64;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 全結合層の隠れ次元
    #[config(default = 128)]
    pub hidden_size: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
}

impl ModelConfig {
    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> BookClassifier<B> {
        // Conv1 (3x3): size -> size - 2, Pool1: / 2
        // Conv2 (3x3): -2, Pool2: / 2
        // Conv3 (3x3): -2, AdaptiveAvgPool: -> 4x4
        let after_pool1 = self.image_size.saturating_sub(2) / 2;
        let after_pool2 = after_pool1.saturating_sub(2) / 2;
        let feature_map_size = after_pool2.saturating_sub(2);

        let d = FEATURE_CHANNELS * POOLED_SIZE * POOLED_SIZE;
        debug!(
            image_size = self.image_size,
            feature_map_size,
            d,
            hidden = self.hidden_size,
            classes = self.num_classes,
            "BookClassifier 初期化"
        );

        BookClassifier {
            conv1: Conv2dConfig::new([3, 16], [3, 3]).init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([16, 32], [3, 3]).init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv3: Conv2dConfig::new([32, FEATURE_CHANNELS], [3, 3]).init(device),
            adaptive_pool: AdaptiveAvgPool2dConfig::new([POOLED_SIZE, POOLED_SIZE]).init(),
            fc1: LinearConfig::new(d, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// 書籍分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 + ReLU
/// - AdaptiveAvgPool 4x4 + Flatten
/// - FC: d -> hidden + ReLU
/// - FC: hidden -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct BookClassifier<B: Backend> {
    conv1: Conv2d<B>,  // 3 -> 16
    pool1: MaxPool2d,
    conv2: Conv2d<B>,  // 16 -> 32
    pool2: MaxPool2d,
    conv3: Conv2d<B>,  // 32 -> 64
    adaptive_pool: AdaptiveAvgPool2d,

    // 全結合層
    fc1: Linear<B>,    // 64*4*4 -> hidden
    fc2: Linear<B>,    // hidden -> num_classes

    activation: Relu,
}

impl<B: Backend> BookClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);
        let x = self.adaptive_pool.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// NHWC 入力から確率を求める
    ///
    /// # 引数
    /// - `images_nhwc`: [batch_size, size, size, 3]、値域 [0, 1]
    ///
    /// # 戻り値
    /// - クラス確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images_nhwc: Tensor<B, 4>) -> Tensor<B, 2> {
        let images = images_nhwc.permute([0, 3, 1, 2]);
        softmax(self.forward(images), 1)
    }
}
