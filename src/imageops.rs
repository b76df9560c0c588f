pub mod alpha;
pub mod padding;

use image::{imageops, imageops::FilterType, DynamicImage, RgbaImage};

use crate::source::Dimensions;

/// Resamples to exactly `size` (aspect ratio is not preserved), the way a
/// canvas stretches an image over its full drawing area.
pub fn resample_rgba(image: &DynamicImage, size: Dimensions) -> RgbaImage {
    let rgba = image.to_rgba8();
    if rgba.dimensions() == size.as_tuple() {
        return rgba;
    }
    imageops::resize(&rgba, size.width, size.height, FilterType::Triangle)
}
