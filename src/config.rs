use clap::Parser;
use std::path::PathBuf;

use crate::brush::StrokeSpec;
use crate::settings::{OutputFormat, Preset, QualityModel, QualitySettings};
use crate::source::Dimensions;
use crate::traits::ReductionOptions;
use crate::validation::MAX_DIMENSION;

/// Removes image backgrounds and optionally retouches the mask with brush strokes.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image file or directory of images.
    pub input: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Directory holding `isnet_quint8.onnx`, `isnet.onnx` and `isnet_fp16.onnx`.
    #[arg(short, long, default_value = "models")]
    pub model_dir: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Preset::Balanced)]
    pub preset: Preset,

    /// Overrides the preset's model.
    #[arg(short, long, value_enum)]
    pub quality_model: Option<QualityModel>,

    /// Overrides the preset's output format.
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Overrides the preset's output quality (0.0 to 1.0).
    #[arg(long, value_parser = check_quality)]
    pub output_quality: Option<f32>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Longest side allowed when a large upload is shrunk before segmentation.
    #[arg(long, default_value_t = MAX_DIMENSION, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: u32,

    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u32).range(1..))]
    pub working_width: u32,

    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u32).range(1..))]
    pub working_height: u32,

    /// Brush gesture applied to every result, as `mode:size:x,y[:x,y...]`.
    /// Repeat for several gestures.
    #[arg(short, long = "stroke")]
    pub strokes: Vec<StrokeSpec>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// The preset's settings with any explicit overrides applied.
    pub fn quality_settings(&self) -> QualitySettings {
        let mut settings = self.preset.settings();
        if let Some(model) = self.quality_model {
            settings = settings.with_model(model);
        }
        if let Some(format) = self.format {
            settings = settings.with_output_format(format);
        }
        if let Some(quality) = self.output_quality {
            settings = settings.with_output_quality(quality);
        }
        settings
    }

    pub fn reduction_options(&self) -> ReductionOptions {
        ReductionOptions {
            max_dimension: self.max_dimension,
            ..ReductionOptions::default()
        }
    }

    pub const fn working_size(&self) -> Dimensions {
        Dimensions::new(self.working_width, self.working_height)
    }
}

fn check_quality(s: &str) -> Result<f32, String> {
    let quality: f32 = s
        .parse()
        .map_err(|_| format!("{s} is not a number"))?;
    if !(0.0..=1.0).contains(&quality) {
        return Err(format!("{s} is out of range. Use a value between 0.0 and 1.0"));
    }
    Ok(quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushMode;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["retouch", "photo.jpg"]).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.quality_settings(), QualitySettings::default());
        assert_eq!(config.working_size(), Dimensions::new(400, 400));
        assert!(config.strokes.is_empty());
        assert_eq!(config.verbose, 0);
        assert_eq!(config.reduction_options(), ReductionOptions::default());
    }

    #[test]
    fn test_max_dimension_flows_into_reduction_options() {
        let config = Config::try_parse_from(["retouch", "in", "--max-dimension", "2048"]).unwrap();
        let options = config.reduction_options();
        assert_eq!(options.max_dimension, 2048);
        assert_eq!(options.max_size_bytes, ReductionOptions::default().max_size_bytes);
        assert!(Config::try_parse_from(["retouch", "in", "--max-dimension", "0"]).is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_preset() {
        let config = Config::try_parse_from([
            "retouch",
            "in",
            "out",
            "--preset",
            "speed",
            "--format",
            "webp",
            "--output-quality",
            "0.5",
            "-vv",
        ])
        .unwrap();

        let settings = config.quality_settings();
        assert_eq!(settings.model, QualityModel::Fast);
        assert_eq!(settings.output_format, OutputFormat::WebP);
        assert!((settings.output_quality - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.verbose, 2);
    }

    #[test]
    fn test_repeated_strokes() {
        let config = Config::try_parse_from([
            "retouch",
            "in",
            "--stroke",
            "erase:8:50,50",
            "--stroke",
            "restore:16:10,10:20,20",
        ])
        .unwrap();

        assert_eq!(config.strokes.len(), 2);
        assert_eq!(config.strokes[0].mode, BrushMode::Erase);
        assert_eq!(config.strokes[1].points.len(), 2);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for args in [
            vec!["retouch", "in", "--output-quality", "1.5"],
            vec!["retouch", "in", "--output-quality", "abc"],
            vec!["retouch", "in", "--stroke", "smudge:8:1,1"],
            vec!["retouch", "in", "--working-width", "0"],
            vec!["retouch", "in", "--quality-model", "ultra"],
        ] {
            assert!(Config::try_parse_from(args.clone()).is_err(), "{args:?}");
        }
    }
}
