use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;

use crate::errors::{RetouchError, Result};
use crate::settings::OutputFormat;

/// Lowest JPEG quality the encoder is ever asked for.
const MIN_JPEG_QUALITY: u8 = 1;

/// Maps a `0.0..=1.0` quality onto the JPEG encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    let scaled = (quality.clamp(0.0, 1.0) * 100.0).round() as u8;
    scaled.max(MIN_JPEG_QUALITY)
}

/// Encodes an image in the requested format.
///
/// PNG and WebP are written losslessly with alpha; JPEG drops alpha and
/// honours `quality`.
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let written = match format {
        OutputFormat::Png => image.to_rgba8().write_with_encoder(PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Best,
            FilterType::Adaptive,
        )),
        OutputFormat::Jpeg => image
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality))),
        OutputFormat::WebP => image
            .to_rgba8()
            .write_with_encoder(WebPEncoder::new_lossless(&mut buffer)),
    };

    written.map_err(|e| RetouchError::image_processing(&format!("{format:?} encoding"), e))?;
    Ok(buffer)
}
