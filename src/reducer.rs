use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::codec;
use crate::errors::{RetouchError, Result};
use crate::settings::OutputFormat;
use crate::source::SourceImage;
use crate::traits::{Reduction, ReductionOptions, SizeReducer};
use crate::validation::ImageMime;

const JPEG_QUALITY_STEP: f32 = 0.1;
const MIN_JPEG_QUALITY: f32 = 0.5;

/// Size reducer backed by the `image` crate codecs.
///
/// Downscales so the longer side fits `max_dimension`, then re-encodes in the
/// source format. JPEG output walks the quality down until it fits the size
/// budget. Anything that goes wrong leaves the original bytes in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSizeReducer;

impl ImageSizeReducer {
    pub const fn new() -> Self {
        Self
    }

    fn try_reduce(image: &SourceImage, options: &ReductionOptions) -> Result<Option<SourceImage>> {
        let format = match ImageMime::from_mime_type(image.mime_type()) {
            Some(ImageMime::Jpeg) => OutputFormat::Jpeg,
            Some(ImageMime::Png) => OutputFormat::Png,
            Some(ImageMime::WebP) => OutputFormat::WebP,
            Some(ImageMime::Heic) | None => {
                return Err(RetouchError::Configuration {
                    message: format!("cannot re-encode {}", image.mime_type()),
                })
            }
        };

        let decoded = fit_within(image.decode()?, options.max_dimension);
        let mut quality = options.quality;
        let mut encoded = codec::encode(&decoded, format, quality)?;

        while format == OutputFormat::Jpeg && encoded.len() as u64 > options.max_size_bytes {
            let Some(next) = next_jpeg_quality(quality) else {
                break;
            };
            quality = next;
            debug!(quality, size = encoded.len(), "Re-encoding over budget");
            encoded = codec::encode(&decoded, format, quality)?;
        }

        if encoded.len() as u64 >= image.byte_len() {
            return Ok(None);
        }

        Ok(Some(SourceImage::new(
            image.name(),
            image.mime_type(),
            encoded,
        )))
    }
}

/// One step down the JPEG quality ladder. The last step lands exactly on
/// `MIN_JPEG_QUALITY`; `None` once it has been reached.
fn next_jpeg_quality(quality: f32) -> Option<f32> {
    if quality <= MIN_JPEG_QUALITY + f32::EPSILON {
        return None;
    }
    Some((quality - JPEG_QUALITY_STEP).max(MIN_JPEG_QUALITY))
}

/// Shrinks `image` so neither side exceeds `max_dimension`, keeping aspect ratio.
fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

#[async_trait]
impl SizeReducer for ImageSizeReducer {
    async fn reduce(&self, image: &SourceImage, options: &ReductionOptions) -> Reduction {
        let source = image.clone();
        let options = *options;
        let outcome =
            tokio::task::spawn_blocking(move || Self::try_reduce(&source, &options)).await;

        match outcome {
            Ok(Ok(Some(reduced))) => {
                debug!(
                    before = image.byte_len(),
                    after = reduced.byte_len(),
                    "Size reduction applied"
                );
                Reduction::Reduced(reduced)
            }
            Ok(Ok(None)) => {
                debug!(name = image.name(), "Size reduction produced no gain");
                Reduction::Unchanged
            }
            Ok(Err(e)) => {
                warn!(name = image.name(), error = %e, "Size reduction failed, using original");
                Reduction::Unchanged
            }
            Err(e) => {
                warn!(name = image.name(), error = %e, "Size reduction task aborted, using original");
                Reduction::Unchanged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn noisy_jpeg(width: u32, height: u32) -> Result<Vec<u8>> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(91)])
        });
        codec::encode(&DynamicImage::ImageRgb8(img), OutputFormat::Jpeg, 1.0)
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        let img = DynamicImage::new_rgb8(400, 100);
        let fitted = fit_within(img, 200);
        assert_eq!(fitted.dimensions(), (200, 50));

        let img = DynamicImage::new_rgb8(100, 80);
        assert_eq!(fit_within(img, 200).dimensions(), (100, 80));
    }

    #[test]
    fn test_jpeg_quality_ladder_ends_at_minimum() {
        let mut ladder = Vec::new();
        let mut quality = ReductionOptions::default().quality;
        while let Some(next) = next_jpeg_quality(quality) {
            ladder.push((next * 100.0).round() as u32);
            quality = next;
        }
        assert_eq!(ladder, vec![75, 65, 55, 50]);
        assert_eq!(next_jpeg_quality(0.3), None);
    }

    #[tokio::test]
    async fn test_over_budget_jpeg_reaches_minimum_quality() -> Result<()> {
        let source = SourceImage::new("dense.jpg", "image/jpeg", noisy_jpeg(320, 240)?);
        let options = ReductionOptions {
            max_size_bytes: 1,
            ..ReductionOptions::default()
        };

        let floor = codec::encode(&source.decode()?, OutputFormat::Jpeg, MIN_JPEG_QUALITY)?;
        match ImageSizeReducer::new().reduce(&source, &options).await {
            Reduction::Reduced(reduced) => assert_eq!(reduced.bytes(), floor.as_slice()),
            Reduction::Unchanged => panic!("Expected the image to be re-encoded"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_downscales_oversized_jpeg() -> Result<()> {
        let bytes = noisy_jpeg(640, 480)?;
        let source = SourceImage::new("big.jpg", "image/jpeg", bytes);
        let options = ReductionOptions {
            max_dimension: 160,
            ..ReductionOptions::default()
        };

        match ImageSizeReducer::new().reduce(&source, &options).await {
            Reduction::Reduced(reduced) => {
                assert!(reduced.byte_len() < source.byte_len());
                assert_eq!(reduced.mime_type(), "image/jpeg");
                assert_eq!(reduced.dimensions()?.width, 160);
            }
            Reduction::Unchanged => panic!("Expected the image to be reduced"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_input_is_unchanged() {
        let source = SourceImage::new("broken.jpg", "image/jpeg", vec![0u8; 64]);
        let reduction = ImageSizeReducer::new()
            .reduce(&source, &ReductionOptions::default())
            .await;
        assert_eq!(reduction, Reduction::Unchanged);
        assert_eq!(reduction.into_image_or(&source), source);
    }

    #[tokio::test]
    async fn test_heic_is_unchanged() {
        let source = SourceImage::new("photo.heic", "image/heic", vec![1u8; 64]);
        let reduction = ImageSizeReducer::new()
            .reduce(&source, &ReductionOptions::default())
            .await;
        assert_eq!(reduction, Reduction::Unchanged);
    }
}
