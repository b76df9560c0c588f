use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageReader};

use crate::errors::{RetouchError, Result};
use crate::settings::OutputFormat;
use crate::validation::ImageMime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An uploaded image as the user selected it. Immutable once accepted; the
/// bytes are shared so records and re-runs can hold on to them cheaply.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceImage {
    name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk, deriving the declared MIME type from its
    /// extension. Unknown extensions are declared as `application/octet-stream`
    /// and left for the validation gate to reject.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| RetouchError::FileSystem {
            path: path.to_path_buf(),
            operation: "read source image".to_string(),
            source: e,
        })?;

        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageMime::from_extension)
            .map_or("application/octet-stream", ImageMime::as_str);

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map_or(self.name.as_str(), |(stem, _)| stem)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Reads pixel dimensions from the image header without decoding pixels.
    pub fn dimensions(&self) -> Result<Dimensions> {
        ImageReader::new(Cursor::new(self.bytes()))
            .with_guessed_format()
            .map_err(|e| RetouchError::image_processing("image format detection", e))?
            .into_dimensions()
            .map(Dimensions::from)
            .map_err(|e| RetouchError::image_processing("image dimension decoding", e))
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(self.bytes())
            .map_err(|e| RetouchError::image_processing("source image decoding", e))
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

/// Encoded output of the segmentation collaborator or the editor.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub const fn new(format: OutputFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes)
            .map_err(|e| RetouchError::image_processing("result image decoding", e))
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}
