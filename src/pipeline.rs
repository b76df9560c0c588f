//! Processing pipeline: drives one image through
//! validation → optional size reduction → background removal → complete/error,
//! publishing a single progress percentage and stage throughout.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::{RetouchError, Result};
use crate::source::{Dimensions, EncodedImage, SourceImage};
use crate::settings::QualitySettings;
use crate::traits::{BackgroundRemover, ProgressObserver, Reduction, ReductionOptions, SizeReducer};
use crate::validation::{self, ValidationResult};

const UPLOADING_PERCENT: u8 = 10;
const COMPRESSING_PERCENT: u8 = 20;
const PROCESSING_START_PERCENT: u8 = 30;
const PROCESSING_END_PERCENT: u8 = 90;
const COMPLETE_PERCENT: u8 = 100;

const FALLBACK_ERROR_MESSAGE: &str = "Processing failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Uploading,
    Compressing,
    Processing,
    Complete,
    Error,
}

impl Stage {
    /// Stages with no pending work.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Error)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Compressing => "compressing",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingState {
    pub is_processing: bool,
    /// `0..=100`
    pub progress_percent: u8,
    pub stage: Stage,
    pub error_message: Option<String>,
}

impl ProcessingState {
    pub const fn idle() -> Self {
        Self {
            is_processing: false,
            progress_percent: 0,
            stage: Stage::Idle,
            error_message: None,
        }
    }

    const fn active(stage: Stage, progress_percent: u8) -> Self {
        Self {
            is_processing: true,
            progress_percent,
            stage,
            error_message: None,
        }
    }

    const fn complete(is_processing: bool) -> Self {
        Self {
            is_processing,
            progress_percent: COMPLETE_PERCENT,
            stage: Stage::Complete,
            error_message: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            is_processing: false,
            progress_percent: 0,
            stage: Stage::Error,
            error_message: Some(message),
        }
    }
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Maps a collaborator tick onto the `[30, 90]` band: `30 + 60 * done / total`.
pub fn processing_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return PROCESSING_START_PERCENT;
    }
    let span = f64::from(PROCESSING_END_PERCENT - PROCESSING_START_PERCENT);
    let ratio = (done as f64 / total as f64).clamp(0.0, 1.0);
    let percent = f64::from(PROCESSING_START_PERCENT) + span * ratio;
    (percent.round() as u8).clamp(PROCESSING_START_PERCENT, PROCESSING_END_PERCENT)
}

#[derive(Debug, Clone)]
pub struct ProcessedImageRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub original: SourceImage,
    pub result: EncodedImage,
    pub original_dimensions: Dimensions,
    pub validation: ValidationResult,
    pub processing_duration_ms: u64,
}

/// Owns the published `ProcessingState` and fans every overwrite out to the
/// observers. The only writer of the state.
struct StatePublisher {
    state: ProcessingState,
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl StatePublisher {
    fn publish(&mut self, state: ProcessingState) {
        if state.stage != self.state.stage {
            info!(from = %self.state.stage, to = %state.stage, percent = state.progress_percent, "Stage transition");
        }
        self.state = state;
        for observer in &self.observers {
            observer.on_state_change(&self.state);
        }
    }

    /// Progress ticks never move the bar backwards within a run.
    fn processing_tick(&mut self, stage_label: &str, done: u64, total: u64) {
        let mut percent = processing_percent(done, total);
        if self.state.stage == Stage::Processing {
            percent = percent.max(self.state.progress_percent);
        }
        debug!(stage_label, done, total, percent, "Segmentation progress");
        self.publish(ProcessingState::active(Stage::Processing, percent));
    }
}

/// Coordinates processing jobs and the list of finished results.
///
/// Every job-submitting method takes `&mut self`, so at most one job occupies
/// the state at a time.
pub struct ProcessingSession<R: BackgroundRemover, S: SizeReducer> {
    remover: R,
    reducer: S,
    settings: QualitySettings,
    reduction_options: ReductionOptions,
    publisher: StatePublisher,
    records: Vec<ProcessedImageRecord>,
}

impl<R: BackgroundRemover, S: SizeReducer> ProcessingSession<R, S> {
    pub fn new(remover: R, reducer: S) -> Self {
        Self {
            remover,
            reducer,
            settings: QualitySettings::default(),
            reduction_options: ReductionOptions::default(),
            publisher: StatePublisher {
                state: ProcessingState::idle(),
                observers: Vec::new(),
            },
            records: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: QualitySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_reduction_options(mut self, options: ReductionOptions) -> Self {
        self.reduction_options = options;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.publisher.observers.push(observer);
    }

    pub const fn state(&self) -> &ProcessingState {
        &self.publisher.state
    }

    pub const fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    /// Takes effect for the next job, including re-runs of existing records.
    pub fn set_quality_settings(&mut self, settings: QualitySettings) {
        self.settings = settings;
    }

    /// Finished results, most recent first.
    pub fn records(&self) -> &[ProcessedImageRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&ProcessedImageRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ProcessedImageRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Drops every result and returns the state to idle.
    pub fn cleanup(&mut self) {
        self.records.clear();
        self.publisher.publish(ProcessingState::idle());
    }

    /// Runs one job to completion. On failure the state ends in `error`, the
    /// error is returned, and no record is added.
    pub async fn process(&mut self, source: SourceImage) -> Result<&ProcessedImageRecord> {
        let started = Instant::now();
        info!(name = source.name(), mime = source.mime_type(), bytes = source.byte_len(), "Processing started");

        match self.run(&source, started).await {
            Ok(record) => {
                self.records.insert(0, record);
                self.publisher.publish(ProcessingState::complete(false));
                Ok(&self.records[0])
            }
            Err(e) => {
                let message = match e.to_string() {
                    m if m.trim().is_empty() => FALLBACK_ERROR_MESSAGE.to_string(),
                    m => m,
                };
                error!(name = source.name(), error = %message, "Processing failed");
                self.publisher.publish(ProcessingState::failed(message));
                Err(e)
            }
        }
    }

    /// Removes the record and runs its original bytes through the pipeline
    /// again with the current settings.
    pub async fn reprocess(&mut self, id: &str) -> Result<&ProcessedImageRecord> {
        let record = self.remove(id).ok_or_else(|| RetouchError::UnknownRecord {
            id: id.to_string(),
        })?;
        info!(id, model = ?self.settings.model, "Re-processing with current settings");
        self.process(record.original).await
    }

    async fn run(&mut self, source: &SourceImage, started: Instant) -> Result<ProcessedImageRecord> {
        let validation = validation::validate(source.mime_type(), source.byte_len());
        if !validation.is_valid {
            return Err(RetouchError::Validation {
                reason: validation.failure_reason.clone().unwrap_or_default(),
            });
        }

        self.publisher
            .publish(ProcessingState::active(Stage::Uploading, UPLOADING_PERCENT));

        let working = if validation.needs_size_reduction {
            self.publisher
                .publish(ProcessingState::active(Stage::Compressing, COMPRESSING_PERCENT));
            let reduction = self.reducer.reduce(source, &self.reduction_options).await;
            if reduction == Reduction::Unchanged {
                debug!(name = source.name(), "Size reduction skipped, sending original bytes");
            }
            reduction.into_image_or(source)
        } else {
            source.clone()
        };

        let original_dimensions = working.dimensions()?;

        self.publisher
            .publish(ProcessingState::active(Stage::Processing, PROCESSING_START_PERCENT));

        let settings = self.settings;
        let publisher = &mut self.publisher;
        let result = self
            .remover
            .remove_background(&working, &settings, &mut |stage_label, done, total| {
                publisher.processing_tick(stage_label, done, total);
            })
            .await?;

        let processing_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.publisher.publish(ProcessingState::complete(true));
        info!(
            name = source.name(),
            duration_ms = processing_duration_ms,
            dimensions = %original_dimensions,
            "Processing complete"
        );

        Ok(ProcessedImageRecord {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            original: source.clone(),
            result,
            original_dimensions,
            validation,
            processing_duration_ms,
        })
    }
}
