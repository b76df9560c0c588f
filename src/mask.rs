//! Tri-state edit mask.
//!
//! Each cell records which layer supplies the visible pixel. Raw luma values
//! only appear at the raster boundary (`MaskBand::from_luma` / `to_luma`),
//! which is also where the hysteresis cutoffs live.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::Canvas;

use crate::errors::{RetouchError, Result};
use crate::source::Dimensions;

/// Luma above this reads as restored.
pub const RESTORE_CUTOFF: u8 = 200;
/// Luma below this reads as erased.
pub const ERASE_CUTOFF: u8 = 64;
/// Processed-image alpha above this starts out visible.
pub const INITIAL_ALPHA_CUTOFF: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaskBand {
    /// Show the original image.
    Restored,
    /// Show the processed image.
    #[default]
    Default,
    /// Fully transparent.
    Erased,
}

impl MaskBand {
    pub const fn to_luma(self) -> u8 {
        match self {
            Self::Restored => 255,
            Self::Default => 128,
            Self::Erased => 0,
        }
    }

    pub const fn from_luma(value: u8) -> Self {
        if value > RESTORE_CUTOFF {
            Self::Restored
        } else if value < ERASE_CUTOFF {
            Self::Erased
        } else {
            Self::Default
        }
    }

    /// Starting band for a processed pixel with the given alpha. Never `Restored`.
    pub const fn from_alpha(alpha: u8) -> Self {
        if alpha > INITIAL_ALPHA_CUTOFF {
            Self::Default
        } else {
            Self::Erased
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskRaster {
    dimensions: Dimensions,
    cells: Vec<MaskBand>,
}

impl MaskRaster {
    pub fn filled(dimensions: Dimensions, band: MaskBand) -> Self {
        Self {
            dimensions,
            cells: vec![band; dimensions.pixel_count()],
        }
    }

    /// Derives the starting mask from the processed layer's alpha channel.
    pub fn from_alpha(processed: &RgbaImage) -> Self {
        Self {
            dimensions: processed.dimensions().into(),
            cells: processed
                .pixels()
                .map(|&Rgba([_, _, _, alpha])| MaskBand::from_alpha(alpha))
                .collect(),
        }
    }

    /// Reads a mask back from a luma raster (255/128/0 or anything between).
    pub fn from_luma_image(image: &GrayImage) -> Self {
        Self {
            dimensions: image.dimensions().into(),
            cells: image
                .pixels()
                .map(|&Luma([value])| MaskBand::from_luma(value))
                .collect(),
        }
    }

    pub fn to_luma_image(&self) -> GrayImage {
        let raw = self.cells.iter().map(|band| band.to_luma()).collect();
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }

    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn band(&self, x: u32, y: u32) -> Option<MaskBand> {
        self.index(x, y).map(|i| self.cells[i])
    }

    pub fn cells(&self) -> &[MaskBand] {
        &self.cells
    }

    pub fn count(&self, band: MaskBand) -> usize {
        self.cells.iter().filter(|&&b| b == band).count()
    }

    pub(crate) fn ensure_dimensions(&self, expected: Dimensions) -> Result<()> {
        if self.dimensions != expected {
            return Err(RetouchError::DimensionMismatch {
                expected: expected.as_tuple(),
                actual: self.dimensions.as_tuple(),
            });
        }
        Ok(())
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.dimensions.width && y < self.dimensions.height)
            .then(|| y as usize * self.dimensions.width as usize + x as usize)
    }
}

/// Lets `imageproc` rasterize brush shapes straight into the mask. Colors
/// are translated through the hysteresis bands on the way in.
impl Canvas for MaskRaster {
    type Pixel = Luma<u8>;

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions.as_tuple()
    }

    fn get_pixel(&self, x: u32, y: u32) -> Self::Pixel {
        Luma([self.band(x, y).unwrap_or_default().to_luma()])
    }

    fn draw_pixel(&mut self, x: u32, y: u32, color: Self::Pixel) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = MaskBand::from_luma(color[0]);
        }
    }
}
