use std::fmt;
use std::str::FromStr;

use image::Luma;
use imageproc::drawing::draw_filled_circle_mut;
use tracing::trace;

use crate::compositor::MaskEditor;
use crate::errors::{RetouchError, Result};
use crate::mask::MaskRaster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BrushMode {
    /// Bring back the original pixels.
    #[default]
    Restore,
    /// Make pixels fully transparent.
    Erase,
}

impl BrushMode {
    const fn fill(self) -> Luma<u8> {
        match self {
            Self::Restore => Luma([255]),
            Self::Erase => Luma([0]),
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Restore => Self::Erase,
            Self::Erase => Self::Restore,
        }
    }
}

impl FromStr for BrushMode {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "restore" => Ok(Self::Restore),
            "erase" => Ok(Self::Erase),
            other => Err(RetouchError::Configuration {
                message: format!("unknown brush mode '{other}' (expected restore or erase)"),
            }),
        }
    }
}

impl fmt::Display for BrushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Restore => "restore",
            Self::Erase => "erase",
        })
    }
}

/// Brush radius in working-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BrushSize {
    Small,
    Medium,
    #[default]
    Large,
    Huge,
}

impl BrushSize {
    pub const PALETTE: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::Huge];

    pub const fn radius(self) -> u32 {
        match self {
            Self::Small => 4,
            Self::Medium => 8,
            Self::Large => 16,
            Self::Huge => 32,
        }
    }

    pub fn from_radius(radius: u32) -> Option<Self> {
        Self::PALETTE.into_iter().find(|size| size.radius() == radius)
    }
}

/// Draws a filled disc into the mask. Parts of the disc outside the raster
/// are clipped.
pub fn paint(raster: &mut MaskRaster, center_x: i32, center_y: i32, radius: u32, mode: BrushMode) {
    // A disc wider than twice the raster already covers all of it.
    let size = raster.dimensions();
    let limit = size.width.max(size.height).saturating_mul(2);
    let radius = i32::try_from(radius.min(limit)).unwrap_or(i32::MAX);
    draw_filled_circle_mut(raster, (center_x, center_y), radius, mode.fill());
}

/// Pointer-driven painting state for one editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrushController {
    pub mode: BrushMode,
    pub size: BrushSize,
    painting: bool,
}

impl BrushController {
    pub fn new(mode: BrushMode, size: BrushSize) -> Self {
        Self {
            mode,
            size,
            painting: false,
        }
    }

    pub const fn is_painting(&self) -> bool {
        self.painting
    }

    pub fn pointer_down(&mut self, editor: &mut MaskEditor, x: f32, y: f32) -> Result<bool> {
        self.painting = true;
        self.stroke(editor, x, y)
    }

    /// Paints only while the pointer is down.
    pub fn pointer_move(&mut self, editor: &mut MaskEditor, x: f32, y: f32) -> Result<bool> {
        if !self.painting {
            return Ok(false);
        }
        self.stroke(editor, x, y)
    }

    pub fn pointer_up(&mut self) {
        self.painting = false;
    }

    pub fn pointer_leave(&mut self) {
        self.painting = false;
    }

    fn stroke(&self, editor: &mut MaskEditor, x: f32, y: f32) -> Result<bool> {
        let (cx, cy) = (x.round() as i32, y.round() as i32);
        trace!(x = cx, y = cy, mode = %self.mode, radius = self.size.radius(), "Brush stroke");
        editor.apply_stroke(cx, cy, self.size.radius(), self.mode)
    }
}

/// A pointer gesture written as `mode:size:x,y[:x,y...]`, e.g.
/// `erase:8:50,50:60,50`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeSpec {
    pub mode: BrushMode,
    pub size: BrushSize,
    pub points: Vec<(f32, f32)>,
}

impl StrokeSpec {
    /// Presses at the first point, drags through the rest, then releases.
    /// Returns how many strokes landed on the mask.
    pub fn replay(&self, editor: &mut MaskEditor) -> Result<usize> {
        let mut brush = BrushController::new(self.mode, self.size);
        let mut applied = 0;
        let mut points = self.points.iter();

        if let Some(&(x, y)) = points.next() {
            applied += usize::from(brush.pointer_down(editor, x, y)?);
        }
        for &(x, y) in points {
            applied += usize::from(brush.pointer_move(editor, x, y)?);
        }
        brush.pointer_up();
        Ok(applied)
    }
}

impl FromStr for StrokeSpec {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |detail: &str| RetouchError::Configuration {
            message: format!("invalid stroke '{s}': {detail}"),
        };

        let mut parts = s.split(':');
        let mode = parts
            .next()
            .ok_or_else(|| invalid("missing mode"))?
            .parse::<BrushMode>()?;

        let size = parts
            .next()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(BrushSize::from_radius)
            .ok_or_else(|| invalid("size must be one of 4, 8, 16, 32"))?;

        let points = parts
            .map(|point| {
                let (x, y) = point.split_once(',')?;
                Some((x.trim().parse::<f32>().ok()?, y.trim().parse::<f32>().ok()?))
            })
            .collect::<Option<Vec<(f32, f32)>>>()
            .ok_or_else(|| invalid("points must be x,y pairs"))?;

        if points.is_empty() {
            return Err(invalid("at least one point is required"));
        }

        Ok(Self { mode, size, points })
    }
}
