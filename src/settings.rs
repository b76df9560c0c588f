use clap::ValueEnum;

/// Model-quality selector passed to the segmentation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum QualityModel {
    /// Quantized model, fastest.
    Fast,
    Balanced,
    /// Half-precision model, best edges.
    Max,
}

impl QualityModel {
    /// File stem of the ONNX model backing this selector.
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Fast => "isnet_quint8",
            Self::Balanced => "isnet",
            Self::Max => "isnet_fp16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum OutputFormat {
    Png,
    Jpeg,
    #[value(name = "webp")]
    WebP,
}

impl OutputFormat {
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// JPEG cannot carry the alpha channel the segmentation writes.
    pub const fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySettings {
    pub model: QualityModel,
    pub output_format: OutputFormat,
    /// Encoder quality in `0.0..=1.0`; only lossy formats use it.
    pub output_quality: f32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            model: QualityModel::Balanced,
            output_format: OutputFormat::Png,
            output_quality: 1.0,
        }
    }
}

impl QualitySettings {
    pub fn new(model: QualityModel, output_format: OutputFormat, output_quality: f32) -> Self {
        Self {
            model,
            output_format,
            output_quality: clamp_quality(output_quality),
        }
    }

    pub const fn with_model(mut self, model: QualityModel) -> Self {
        self.model = model;
        self
    }

    pub const fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_output_quality(mut self, output_quality: f32) -> Self {
        self.output_quality = clamp_quality(output_quality);
        self
    }
}

fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        1.0
    } else {
        quality.clamp(0.0, 1.0)
    }
}

/// One-click settings bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Speed,
    Balanced,
    Quality,
}

impl Preset {
    pub fn settings(self) -> QualitySettings {
        match self {
            Self::Speed => QualitySettings::new(QualityModel::Fast, OutputFormat::Png, 0.9),
            Self::Balanced => QualitySettings::new(QualityModel::Balanced, OutputFormat::Png, 1.0),
            Self::Quality => QualitySettings::new(QualityModel::Max, OutputFormat::Png, 1.0),
        }
    }
}
