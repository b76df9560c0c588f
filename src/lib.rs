pub mod brush;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod imageops;
pub mod mask;
pub mod model;
pub mod pipeline;
pub mod progress_tracker;
pub mod reducer;
pub mod settings;
pub mod source;
pub mod tracing_config;
pub mod traits;
pub mod validation;

pub mod mocks;

pub use brush::{BrushController, BrushMode, BrushSize, StrokeSpec};
pub use compositor::{composite, initialize, CompositeCanvas, MaskEditor};
pub use config::Config;
pub use errors::{Result, RetouchError};
pub use mask::{MaskBand, MaskRaster};
pub use model::OnnxRemover;
pub use pipeline::{ProcessedImageRecord, ProcessingSession, ProcessingState, Stage};
pub use progress_tracker::ProgressBarObserver;
pub use reducer::ImageSizeReducer;
pub use settings::{OutputFormat, Preset, QualityModel, QualitySettings};
pub use source::{Dimensions, EncodedImage, SourceImage};
pub use traits::*;
pub use validation::{validate, ValidationResult};
