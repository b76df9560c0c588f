use image::{DynamicImage, Luma, Rgba, RgbaImage};

use retouch_rs::mocks::{MockBackgroundRemover, MockSizeReducer};
use retouch_rs::{
    codec, composite, initialize, BrushController, BrushMode, BrushSize, Dimensions, MaskBand,
    MaskEditor, MaskRaster, OutputFormat, ProcessingSession, Result, SourceImage, StrokeSpec,
};

const ORIGINAL: Rgba<u8> = Rgba([220, 40, 40, 255]);
const PROCESSED: Rgba<u8> = Rgba([40, 40, 220, 255]);

fn layers(width: u32, height: u32) -> (DynamicImage, DynamicImage) {
    (
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, ORIGINAL)),
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, PROCESSED)),
    )
}

fn editor(width: u32, height: u32) -> Result<MaskEditor> {
    let (original, processed) = layers(width, height);
    let mut editor = MaskEditor::new(Dimensions::new(width, height));
    editor.load_original(&original)?;
    editor.load_processed(&processed)?;
    Ok(editor)
}

fn distance(x: u32, y: u32, cx: u32, cy: u32) -> f64 {
    let dx = f64::from(x) - f64::from(cx);
    let dy = f64::from(y) - f64::from(cy);
    (dx * dx + dy * dy).sqrt()
}

#[test]
fn test_erase_disc_leaves_everything_else_untouched() -> Result<()> {
    let mut editor = editor(100, 100)?;
    assert!(editor.apply_stroke(50, 50, 8, BrushMode::Erase)?);

    let canvas = editor.canvas().expect("editor is ready");
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let d = distance(x, y, 50, 50);
        if d <= 7.0 {
            assert_eq!(pixel[3], 0, "({x},{y}) should be erased");
        } else if d > 9.0 {
            assert_eq!(*pixel, PROCESSED, "({x},{y}) should be unchanged");
        }
    }
    Ok(())
}

#[test]
fn test_untouched_mask_reproduces_processed_image() -> Result<()> {
    let size = Dimensions::new(400, 400);
    let mut processed = RgbaImage::from_fn(400, 400, |x, y| Rgba([x as u8, y as u8, 90, 255]));
    processed.put_pixel(10, 10, Rgba([1, 2, 3, 255]));
    let original = RgbaImage::from_pixel(400, 400, ORIGINAL);

    let mask = initialize(
        &DynamicImage::ImageRgba8(original.clone()),
        &DynamicImage::ImageRgba8(processed.clone()),
        size,
    )?;
    assert_eq!(mask.count(MaskBand::Default), size.pixel_count());

    let canvas = composite(&original, &processed, &mask, size)?;
    assert_eq!(canvas, processed);
    Ok(())
}

#[test]
fn test_transparent_background_starts_erased() -> Result<()> {
    let (original, _) = layers(20, 20);
    let processed = RgbaImage::from_fn(20, 20, |x, _| {
        if x < 10 {
            PROCESSED
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    let mut editor = MaskEditor::new(Dimensions::new(20, 20));
    editor.load_processed(&DynamicImage::ImageRgba8(processed))?;
    editor.load_original(&original)?;

    let mask = editor.mask().expect("editor is ready");
    assert_eq!(mask.band(2, 2), Some(MaskBand::Default));
    assert_eq!(mask.band(15, 2), Some(MaskBand::Erased));

    // Restoring over the transparent half brings the original back.
    editor.apply_stroke(15, 10, 2, BrushMode::Restore)?;
    let canvas = editor.canvas().expect("editor is ready");
    assert_eq!(*canvas.get_pixel(15, 10), ORIGINAL);
    assert_eq!(canvas.get_pixel(19, 0)[3], 0);
    Ok(())
}

#[test]
fn test_repeated_strokes_are_idempotent() -> Result<()> {
    let mut once = editor(64, 64)?;
    once.apply_stroke(20, 20, 16, BrushMode::Restore)?;

    let mut twice = editor(64, 64)?;
    twice.apply_stroke(20, 20, 16, BrushMode::Restore)?;
    twice.apply_stroke(20, 20, 16, BrushMode::Restore)?;

    assert_eq!(once.mask(), twice.mask());
    assert_eq!(once.canvas(), twice.canvas());
    Ok(())
}

#[test]
fn test_mask_image_round_trips_through_luma() -> Result<()> {
    let mut editor = editor(40, 40)?;
    editor.apply_stroke(10, 10, 4, BrushMode::Restore)?;
    editor.apply_stroke(30, 30, 4, BrushMode::Erase)?;

    let luma = editor.mask_image()?;
    assert_eq!(luma.get_pixel(10, 10), &Luma([255]));
    assert_eq!(luma.get_pixel(20, 20), &Luma([128]));
    assert_eq!(luma.get_pixel(30, 30), &Luma([0]));

    let restored = MaskRaster::from_luma_image(&luma);
    assert_eq!(Some(&restored), editor.mask());
    Ok(())
}

#[test]
fn test_layers_are_resampled_to_working_size() -> Result<()> {
    let (original, processed) = layers(800, 600);
    let mut editor = MaskEditor::new(Dimensions::new(400, 400));
    editor.load_original(&original)?;
    editor.load_processed(&processed)?;

    assert_eq!(editor.canvas().map(|c| c.dimensions()), Some((400, 400)));
    assert_eq!(
        editor.mask().map(|m| m.dimensions()),
        Some(Dimensions::new(400, 400))
    );
    Ok(())
}

#[test]
fn test_pointer_gesture_paints_along_the_drag() -> Result<()> {
    let mut editor = editor(100, 100)?;
    let mut brush = BrushController::new(BrushMode::Erase, BrushSize::Small);

    brush.pointer_move(&mut editor, 10.0, 10.0)?;
    brush.pointer_down(&mut editor, 30.0, 50.0)?;
    brush.pointer_move(&mut editor, 60.0, 50.0)?;
    brush.pointer_up();
    brush.pointer_move(&mut editor, 90.0, 90.0)?;

    let canvas = editor.canvas().expect("editor is ready");
    assert_eq!(*canvas.get_pixel(10, 10), PROCESSED);
    assert_eq!(canvas.get_pixel(30, 50)[3], 0);
    assert_eq!(canvas.get_pixel(60, 50)[3], 0);
    assert_eq!(*canvas.get_pixel(90, 90), PROCESSED);
    Ok(())
}

#[tokio::test]
async fn test_edit_a_processed_record_and_export() -> Result<()> {
    let photo = RgbaImage::from_pixel(400, 400, ORIGINAL);
    let png = codec::encode(&DynamicImage::ImageRgba8(photo), OutputFormat::Png, 1.0)?;
    let mut session = ProcessingSession::new(
        MockBackgroundRemover::new().with_alpha(0),
        MockSizeReducer::unchanged(),
    );

    let record = session
        .process(SourceImage::new("subject.png", "image/png", png))
        .await?;
    let mut editor = record.open_editor(Dimensions::new(400, 400))?;
    assert_eq!(
        editor.mask().map(|m| m.count(MaskBand::Erased)),
        Some(400 * 400)
    );

    let stroke: StrokeSpec = "restore:32:200,200".parse()?;
    assert_eq!(stroke.replay(&mut editor)?, 1);

    let exported = image::load_from_memory(&editor.export_png()?)?.to_rgba8();
    assert_eq!(exported.dimensions(), (400, 400));
    assert_eq!(*exported.get_pixel(200, 200), ORIGINAL);
    assert_eq!(exported.get_pixel(0, 0)[3], 0);
    Ok(())
}
