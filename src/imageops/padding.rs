use image::{imageops, GenericImageView, ImageBuffer, Pixel, Primitive};

/// Where the source lands inside the padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Centers `image` on a `side`×`side` canvas filled with `color`.
///
/// Returns `None` when the image does not fit.
pub fn pad_to_square<I, P, S>(image: &I, side: u32, color: P) -> Option<(ImageBuffer<P, Vec<S>>, Placement)>
where
    I: GenericImageView<Pixel = P>,
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    let (width, height) = image.dimensions();
    if width > side || height > side {
        return None;
    }

    let placement = Placement {
        x: (side - width) / 2,
        y: (side - height) / 2,
        width,
        height,
    };

    let mut canvas = ImageBuffer::from_pixel(side, side, color);
    imageops::overlay(&mut canvas, image, i64::from(placement.x), i64::from(placement.y));
    Some((canvas, placement))
}

/// Size that fits `(width, height)` inside a `side`×`side` square, keeping
/// aspect ratio. Never returns a zero dimension.
pub fn fit_inside(width: u32, height: u32, side: u32) -> (u32, u32) {
    let longest = width.max(height).max(1);
    let scale = f64::from(side) / f64::from(longest);
    let fit = |v: u32| ((f64::from(v) * scale).round() as u32).clamp(1, side);
    (fit(width), fit(height))
}
