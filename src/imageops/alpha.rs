use image::{DynamicImage, ImageBuffer, Luma, Rgba, RgbaImage};

use crate::errors::{RetouchError, Result};

/// Soft segmentation mask in `0.0..=1.0`.
pub type SoftMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Replaces the alpha channel of `image` with `mask`, scaled to 0..=255.
pub fn replace_alpha(image: &DynamicImage, mask: &SoftMask) -> Result<RgbaImage> {
    let rgba = image.to_rgba8();
    if rgba.dimensions() != mask.dimensions() {
        return Err(RetouchError::DimensionMismatch {
            expected: rgba.dimensions(),
            actual: mask.dimensions(),
        });
    }

    let pixels = rgba
        .pixels()
        .zip(mask.pixels())
        .flat_map(|(&Rgba([r, g, b, _]), &Luma([m]))| {
            let alpha = (m.clamp(0.0, 1.0) * 255.0).round() as u8;
            [r, g, b, alpha]
        })
        .collect();

    RgbaImage::from_raw(rgba.width(), rgba.height(), pixels).ok_or(RetouchError::DimensionMismatch {
        expected: rgba.dimensions(),
        actual: mask.dimensions(),
    })
}
