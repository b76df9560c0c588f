use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{ProcessingState, Stage};
use crate::traits::ProgressObserver;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {prefix} {msg}";

/// Renders pipeline state changes as a terminal progress bar.
pub struct ProgressBarObserver {
    progress_bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new(label: impl Into<String>) -> Self {
        let progress_bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            progress_bar.set_style(style.progress_chars("#>-"));
        }
        progress_bar.set_prefix(label.into());
        Self::with_bar(progress_bar)
    }

    /// Wraps an existing bar, e.g. one owned by a `MultiProgress` or a hidden
    /// bar in tests.
    pub const fn with_bar(progress_bar: ProgressBar) -> Self {
        Self { progress_bar }
    }

    pub fn progress_bar(&self) -> &ProgressBar {
        &self.progress_bar
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_state_change(&self, state: &ProcessingState) {
        self.progress_bar
            .set_position(u64::from(state.progress_percent));

        match state.stage {
            Stage::Complete if !state.is_processing => {
                self.progress_bar.finish_with_message(state.stage.as_str());
            }
            Stage::Error => {
                let message = state
                    .error_message
                    .clone()
                    .unwrap_or_else(|| state.stage.to_string());
                self.progress_bar.abandon_with_message(message);
            }
            stage => self.progress_bar.set_message(stage.as_str()),
        }
    }
}
