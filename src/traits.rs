use async_trait::async_trait;

use crate::errors::Result;
use crate::pipeline::ProcessingState;
use crate::settings::QualitySettings;
use crate::source::{EncodedImage, SourceImage};
use crate::validation::{MAX_DIMENSION, RECOMMENDED_SIZE};

/// セグメンテーション進捗コールバック `(stage_label, done, total)`
///
/// 1ジョブ内では `done / total` が単調非減少の順で呼び出されること
pub type ProgressCallback<'a> = dyn FnMut(&str, u64, u64) + Send + 'a;

/// 背景除去（セグメンテーション）コラボレーターの抽象化
///
/// 依存関係逆転原則（DIP）に従い、パイプラインは具象モデルではなくこの抽象に依存する
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// 画像を受け取り、前景マスクをアルファチャンネルに持つ画像を返す
    async fn remove_background(
        &self,
        image: &SourceImage,
        settings: &QualitySettings,
        on_progress: &mut ProgressCallback<'_>,
    ) -> Result<EncodedImage>;
}

/// サイズ削減の結果
///
/// 失敗は例外ではなく `Unchanged` として表現し、呼び出し側は元画像を使い続ける
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    Reduced(SourceImage),
    Unchanged,
}

impl Reduction {
    /// 削減済み画像、なければ元画像
    pub fn into_image_or(self, original: &SourceImage) -> SourceImage {
        match self {
            Self::Reduced(image) => image,
            Self::Unchanged => original.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionOptions {
    pub max_size_bytes: u64,
    pub max_dimension: u32,
    /// `0.0..=1.0`
    pub quality: f32,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self {
            max_size_bytes: RECOMMENDED_SIZE,
            max_dimension: MAX_DIMENSION,
            quality: 0.85,
        }
    }
}

/// サイズ削減コラボレーターの抽象化（ベストエフォート、失敗しない）
#[async_trait]
pub trait SizeReducer: Send + Sync {
    async fn reduce(&self, image: &SourceImage, options: &ReductionOptions) -> Reduction;
}

/// `ProcessingState` の変更通知を受け取るオブザーバー
///
/// 状態は遷移ごとに丸ごと置き換えられ、部分的な更新は通知されない
pub trait ProgressObserver: Send + Sync {
    fn on_state_change(&self, state: &ProcessingState);
}
