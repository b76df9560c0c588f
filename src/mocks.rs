use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::codec;
use crate::errors::{RetouchError, Result};
use crate::pipeline::{ProcessingState, Stage};
use crate::settings::QualitySettings;
use crate::source::{EncodedImage, SourceImage};
use crate::traits::{
    BackgroundRemover, ProgressCallback, ProgressObserver, Reduction, ReductionOptions,
    SizeReducer,
};

/// テスト用のモック背景除去コラボレーター
///
/// 入力画像をデコードし、全ピクセルのアルファを `alpha` に置き換えて返す
#[derive(Debug, Clone)]
pub struct MockBackgroundRemover {
    pub ticks: Vec<(u64, u64)>,
    pub alpha: u8,
    pub delay: Duration,
    pub failure: Option<String>,
    settings_seen: std::sync::Arc<Mutex<Vec<QualitySettings>>>,
}

impl MockBackgroundRemover {
    pub fn new() -> Self {
        Self {
            ticks: vec![(1, 10), (5, 10), (10, 10)],
            alpha: 255,
            delay: Duration::from_millis(5),
            failure: None,
            settings_seen: std::sync::Arc::default(),
        }
    }

    pub fn with_ticks(mut self, ticks: Vec<(u64, u64)>) -> Self {
        self.ticks = ticks;
        self
    }

    pub const fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }

    /// 空文字列を渡すとメッセージなしの失敗になる
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// これまでの呼び出しで渡された設定
    pub fn settings_seen(&self) -> Vec<QualitySettings> {
        self.settings_seen.lock().clone()
    }
}

impl Default for MockBackgroundRemover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundRemover for MockBackgroundRemover {
    async fn remove_background(
        &self,
        image: &SourceImage,
        settings: &QualitySettings,
        on_progress: &mut ProgressCallback<'_>,
    ) -> Result<EncodedImage> {
        self.settings_seen.lock().push(*settings);

        for &(done, total) in &self.ticks {
            on_progress("compute:inference", done, total);
        }

        // 処理時間が 0ms にならないように待機
        tokio::time::sleep(self.delay).await;

        if let Some(message) = &self.failure {
            return Err(RetouchError::Segmentation {
                message: message.clone(),
            });
        }

        let mut rgba = image.decode()?.to_rgba8();
        for pixel in rgba.pixels_mut() {
            pixel[3] = self.alpha;
        }
        let bytes = codec::encode(
            &DynamicImage::ImageRgba8(rgba),
            settings.output_format,
            settings.output_quality,
        )?;
        Ok(EncodedImage::new(settings.output_format, bytes))
    }
}

/// テスト用のモックサイズ削減コラボレーター
///
/// クローンは呼び出し記録を共有する
#[derive(Debug, Clone, Default)]
pub struct MockSizeReducer {
    pub reduce_to: Option<usize>,
    options_seen: std::sync::Arc<Mutex<Vec<ReductionOptions>>>,
}

impl MockSizeReducer {
    /// 常に `Unchanged` を返す
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// 先頭 `len` バイトに切り詰めた画像を返す
    pub fn truncating(len: usize) -> Self {
        Self {
            reduce_to: Some(len),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.options_seen.lock().len()
    }

    /// これまでの呼び出しで渡されたオプション
    pub fn options_seen(&self) -> Vec<ReductionOptions> {
        self.options_seen.lock().clone()
    }
}

#[async_trait]
impl SizeReducer for MockSizeReducer {
    async fn reduce(&self, image: &SourceImage, options: &ReductionOptions) -> Reduction {
        self.options_seen.lock().push(*options);
        match self.reduce_to {
            Some(len) if len < image.bytes().len() => Reduction::Reduced(SourceImage::new(
                image.name(),
                image.mime_type(),
                &image.bytes()[..len],
            )),
            _ => Reduction::Unchanged,
        }
    }
}

/// 通知された状態をすべて記録するオブザーバー
#[derive(Debug, Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<ProcessingState>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<ProcessingState> {
        self.states.lock().clone()
    }

    /// 連続する重複を除いたステージの遷移列
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.states.lock().iter().map(|s| s.stage).collect();
        stages.dedup();
        stages
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_state_change(&self, state: &ProcessingState) {
        self.states.lock().push(state.clone());
    }
}

/// テスト用の単色画像を PNG で作成する
pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Result<Vec<u8>> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    codec::encode(
        &DynamicImage::ImageRgba8(img),
        crate::settings::OutputFormat::Png,
        1.0,
    )
}
