//! Validation gate: decides whether a source image may enter the pipeline.
//!
//! This is a pure function of the declared MIME type and byte size. It runs
//! before any expensive work and is the only authority on admission.

pub const MIB: u64 = 1024 * 1024;

/// Hard cap on accepted input size.
pub const MAX_FILE_SIZE: u64 = 10 * MIB;
/// Ceiling the size reducer aims for.
pub const RECOMMENDED_SIZE: u64 = 5 * MIB;
/// Inputs above this are sent through the size reducer first.
pub const SIZE_REDUCTION_THRESHOLD: u64 = 2 * MIB;
/// Longest side the size reducer will leave untouched.
pub const MAX_DIMENSION: u32 = 4000;

const UNSUPPORTED_FORMAT_REASON: &str = "Unsupported file format. Please use JPG, PNG, WebP, or HEIC.";

/// Input formats accepted by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
    Jpeg,
    Png,
    WebP,
    Heic,
}

impl ImageMime {
    pub const ALL: [Self; 4] = [Self::Jpeg, Self::Png, Self::WebP, Self::Heic];

    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mime| mime.as_str() == mime_type)
    }

    /// Maps a file extension to its MIME type, used when reading from disk.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Heic => "image/heic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub failure_reason: Option<String>,
    pub needs_size_reduction: bool,
    /// Empty when the input was rejected.
    pub estimated_duration: String,
    pub byte_size: u64,
}

impl ValidationResult {
    fn rejected(reason: String, byte_size: u64) -> Self {
        Self {
            is_valid: false,
            failure_reason: Some(reason),
            needs_size_reduction: false,
            estimated_duration: String::new(),
            byte_size,
        }
    }
}

pub fn validate(mime_type: &str, byte_size: u64) -> ValidationResult {
    if ImageMime::from_mime_type(mime_type).is_none() {
        return ValidationResult::rejected(UNSUPPORTED_FORMAT_REASON.to_string(), byte_size);
    }

    if byte_size > MAX_FILE_SIZE {
        return ValidationResult::rejected(
            format!(
                "File too large ({}). Maximum size is 10MB.",
                format_file_size(byte_size)
            ),
            byte_size,
        );
    }

    ValidationResult {
        is_valid: true,
        failure_reason: None,
        needs_size_reduction: byte_size > SIZE_REDUCTION_THRESHOLD,
        estimated_duration: estimated_duration(byte_size).to_string(),
        byte_size,
    }
}

pub const fn estimated_duration(byte_size: u64) -> &'static str {
    if byte_size < MIB {
        "<5s"
    } else if byte_size < 5 * MIB {
        "5-15s"
    } else {
        "15-30s"
    }
}

/// Human-readable size in base 1024 with at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Note shown next to large uploads, if any.
pub fn size_advice(byte_size: u64) -> Option<String> {
    if byte_size > RECOMMENDED_SIZE {
        Some(format!(
            "Large file detected ({}). Processing may take {}.",
            format_file_size(byte_size),
            estimated_duration(byte_size)
        ))
    } else if byte_size > SIZE_REDUCTION_THRESHOLD {
        Some("Large image optimized for faster processing".to_string())
    } else {
        None
    }
}
