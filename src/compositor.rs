//! Three-layer compositing: original, processed and the edit mask blend into
//! one visible image at a fixed working resolution.

use image::{DynamicImage, GrayImage, RgbaImage};
use tracing::debug;

use crate::brush::{self, BrushMode};
use crate::codec;
use crate::errors::{RetouchError, Result};
use crate::imageops::resample_rgba;
use crate::mask::{MaskBand, MaskRaster};
use crate::pipeline::ProcessedImageRecord;
use crate::settings::OutputFormat;
use crate::source::Dimensions;

/// Rendered output at the working resolution.
pub type CompositeCanvas = RgbaImage;

/// Builds the starting mask for an original/processed pair at the working
/// size: visible processed pixels are `Default`, the rest `Erased`. No cell
/// starts out `Restored`.
pub fn initialize(
    original: &DynamicImage,
    processed: &DynamicImage,
    working_size: Dimensions,
) -> Result<MaskRaster> {
    let original = resample_rgba(original, working_size);
    let processed = resample_rgba(processed, working_size);
    ensure_layer_sizes(&original, &processed, working_size)?;
    Ok(MaskRaster::from_alpha(&processed))
}

fn ensure_layer_sizes(original: &RgbaImage, processed: &RgbaImage, working_size: Dimensions) -> Result<()> {
    for layer in [original, processed] {
        if layer.dimensions() != working_size.as_tuple() {
            return Err(RetouchError::DimensionMismatch {
                expected: working_size.as_tuple(),
                actual: layer.dimensions(),
            });
        }
    }
    Ok(())
}

/// Recomputes every output pixel from the mask.
///
/// Stateless with respect to earlier calls: the result depends only on the
/// three inputs.
pub fn composite(
    original: &RgbaImage,
    processed: &RgbaImage,
    mask: &MaskRaster,
    working_size: Dimensions,
) -> Result<CompositeCanvas> {
    mask.ensure_dimensions(working_size)?;
    ensure_layer_sizes(original, processed, working_size)?;

    let mut canvas = processed.clone();
    for ((out, &source), &band) in canvas
        .pixels_mut()
        .zip(original.pixels())
        .zip(mask.cells())
    {
        match band {
            MaskBand::Restored => *out = source,
            MaskBand::Default => {}
            MaskBand::Erased => out[3] = 0,
        }
    }
    Ok(canvas)
}

/// One interactive editing session over an original/processed image pair.
///
/// The mask is (re)initialized when both layers are present. Until then every
/// edit is a no-op and there is nothing to render.
#[derive(Debug, Clone)]
pub struct MaskEditor {
    working_size: Dimensions,
    original: Option<RgbaImage>,
    processed: Option<RgbaImage>,
    mask: Option<MaskRaster>,
    canvas: Option<CompositeCanvas>,
}

impl MaskEditor {
    pub const fn new(working_size: Dimensions) -> Self {
        Self {
            working_size,
            original: None,
            processed: None,
            mask: None,
            canvas: None,
        }
    }

    /// Opens an editor on a finished pipeline result.
    pub fn from_record(record: &ProcessedImageRecord, working_size: Dimensions) -> Result<Self> {
        let mut editor = Self::new(working_size);
        editor.load_original(&record.original.decode()?)?;
        editor.load_processed(&record.result.decode()?)?;
        Ok(editor)
    }

    pub const fn working_size(&self) -> Dimensions {
        self.working_size
    }

    pub fn load_original(&mut self, image: &DynamicImage) -> Result<()> {
        self.original = Some(resample_rgba(image, self.working_size));
        self.reinitialize()
    }

    pub fn load_processed(&mut self, image: &DynamicImage) -> Result<()> {
        self.processed = Some(resample_rgba(image, self.working_size));
        self.reinitialize()
    }

    pub const fn is_ready(&self) -> bool {
        self.mask.is_some()
    }

    pub const fn mask(&self) -> Option<&MaskRaster> {
        self.mask.as_ref()
    }

    pub const fn canvas(&self) -> Option<&CompositeCanvas> {
        self.canvas.as_ref()
    }

    /// Paints one brush disc and recomposites. Returns `false` without
    /// touching anything if the editor is not ready yet.
    pub fn apply_stroke(&mut self, center_x: i32, center_y: i32, radius: u32, mode: BrushMode) -> Result<bool> {
        let Some(mask) = self.mask.as_mut() else {
            debug!("Stroke ignored, layers still loading");
            return Ok(false);
        };
        brush::paint(mask, center_x, center_y, radius, mode);
        self.recomposite()?;
        Ok(true)
    }

    /// The composite as a PNG, preserving transparency.
    pub fn export_png(&self) -> Result<Vec<u8>> {
        let canvas = self.canvas.as_ref().ok_or(self.missing_layer())?;
        codec::encode(&DynamicImage::ImageRgba8(canvas.clone()), OutputFormat::Png, 1.0)
    }

    /// The mask as a 255/128/0 luma raster.
    pub fn mask_image(&self) -> Result<GrayImage> {
        self.mask
            .as_ref()
            .map(MaskRaster::to_luma_image)
            .ok_or(self.missing_layer())
    }

    fn missing_layer(&self) -> RetouchError {
        let missing = if self.original.is_none() {
            "original"
        } else {
            "processed"
        };
        RetouchError::EditorNotReady { missing }
    }

    fn reinitialize(&mut self) -> Result<()> {
        let Some(processed) = self.processed.as_ref() else {
            return Ok(());
        };
        if self.original.is_none() {
            return Ok(());
        }

        let mask = MaskRaster::from_alpha(processed);
        debug!(
            size = %self.working_size,
            visible = mask.count(MaskBand::Default),
            "Mask initialized"
        );
        self.mask = Some(mask);
        self.recomposite()
    }

    fn recomposite(&mut self) -> Result<()> {
        if let (Some(original), Some(processed), Some(mask)) =
            (&self.original, &self.processed, &self.mask)
        {
            self.canvas = Some(composite(original, processed, mask, self.working_size)?);
        }
        Ok(())
    }
}

impl ProcessedImageRecord {
    /// Starts a mask editing session on this result.
    pub fn open_editor(&self, working_size: Dimensions) -> Result<MaskEditor> {
        MaskEditor::from_record(self, working_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use imageproc::drawing::Canvas as _;

    const SIZE: Dimensions = Dimensions::new(8, 8);

    fn layers() -> (RgbaImage, RgbaImage) {
        let original = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]));
        let processed = RgbaImage::from_pixel(8, 8, Rgba([20, 200, 20, 255]));
        (original, processed)
    }

    #[test]
    fn test_default_mask_reproduces_processed() -> Result<()> {
        let (original, processed) = layers();
        let mask = MaskRaster::from_alpha(&processed);
        let canvas = composite(&original, &processed, &mask, SIZE)?;
        assert_eq!(canvas, processed);
        Ok(())
    }

    #[test]
    fn test_each_band_selects_its_layer() -> Result<()> {
        let (original, processed) = layers();
        let mut mask = MaskRaster::filled(SIZE, MaskBand::Default);
        mask.draw_pixel(0, 0, image::Luma([255]));
        mask.draw_pixel(1, 0, image::Luma([0]));

        let canvas = composite(&original, &processed, &mask, SIZE)?;
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([200, 10, 10, 255]));
        assert_eq!(canvas.get_pixel(1, 0), &Rgba([20, 200, 20, 0]));
        assert_eq!(canvas.get_pixel(2, 0), &Rgba([20, 200, 20, 255]));
        Ok(())
    }

    #[test]
    fn test_composite_rejects_mismatched_mask() {
        let (original, processed) = layers();
        let mask = MaskRaster::filled(Dimensions::new(4, 4), MaskBand::Default);
        assert!(matches!(
            composite(&original, &processed, &mask, SIZE),
            Err(RetouchError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_initialize_resamples_both_layers() -> Result<()> {
        let original = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 5, Rgba([9, 9, 9, 255])));
        let processed = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 16, Rgba([0, 0, 0, 0])));
        let mask = initialize(&original, &processed, SIZE)?;
        assert_eq!(mask.dimensions(), SIZE);
        assert_eq!(mask.count(MaskBand::Erased), SIZE.pixel_count());

        let (original, processed) = layers();
        let mask = initialize(
            &DynamicImage::ImageRgba8(original.clone()),
            &DynamicImage::ImageRgba8(processed.clone()),
            SIZE,
        )?;
        assert_eq!(mask.count(MaskBand::Default), SIZE.pixel_count());
        assert_eq!(composite(&original, &processed, &mask, SIZE)?, processed);
        Ok(())
    }

    #[test]
    fn test_layer_size_check_reports_offending_layer() {
        let (original, _) = layers();
        let small = RgbaImage::new(4, 8);
        assert!(matches!(
            ensure_layer_sizes(&original, &small, SIZE),
            Err(RetouchError::DimensionMismatch { actual: (4, 8), .. })
        ));
        assert!(ensure_layer_sizes(&original, &original, SIZE).is_ok());
    }

    #[test]
    fn test_editor_waits_for_both_layers() -> Result<()> {
        let (original, processed) = layers();
        let mut editor = MaskEditor::new(SIZE);
        editor.load_processed(&DynamicImage::ImageRgba8(processed))?;

        assert!(!editor.is_ready());
        assert!(!editor.apply_stroke(4, 4, 2, BrushMode::Erase)?);
        assert!(matches!(
            editor.export_png(),
            Err(RetouchError::EditorNotReady { missing: "original" })
        ));

        editor.load_original(&DynamicImage::ImageRgba8(original))?;
        assert!(editor.is_ready());
        assert!(editor.canvas().is_some());
        assert!(editor.apply_stroke(4, 4, 2, BrushMode::Restore)?);
        assert_eq!(editor.canvas().map(|c| *c.get_pixel(4, 4)), Some(Rgba([200, 10, 10, 255])));
        Ok(())
    }

    #[test]
    fn test_export_png_keeps_transparency() -> Result<()> {
        let (original, processed) = layers();
        let mut editor = MaskEditor::new(SIZE);
        editor.load_original(&DynamicImage::ImageRgba8(original))?;
        editor.load_processed(&DynamicImage::ImageRgba8(processed))?;
        editor.apply_stroke(0, 0, 1, BrushMode::Erase)?;

        let png = image::load_from_memory(&editor.export_png()?)?.to_rgba8();
        assert_eq!(png.dimensions(), (8, 8));
        assert_eq!(png.get_pixel(0, 0)[3], 0);
        assert_eq!(png.get_pixel(7, 7)[3], 255);
        Ok(())
    }
}
