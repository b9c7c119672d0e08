// THEORY:
// The `Surface` is the transparent drawing layer stacked over the video. It is
// deliberately shaped like a 2D canvas context: clear, stroke a rectangle, fill
// a rectangle, measure and fill text. Anything that can do those five things can
// host the overlay, whether it is an in-memory image, an OpenCV window or a
// recorder used to assert on exactly what was drawn.
//
// Key principles:
// 1.  **Geometry is never corrected**: rectangles arrive in frame pixel space and
//     are passed through untouched. A backend may skip pixels that fall outside
//     its buffer, but it never clamps or rescales the shapes themselves.
// 2.  **Explicit size**: a surface knows its size because it was told, either at
//     construction or through `resize`. Nothing reads viewport globals.
// 3.  **Text anchor**: `fill_text` positions the *bottom-left* of the text at the
//     given point, so text drawn at a box's top-left corner sits above the box.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Width and height of a drawing surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in surface pixels. May be partially or fully off-surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// An 8-bit RGBA colour. Parses from `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("colour {s:?} must start with '#'"))?;
        if !hex.is_ascii() {
            return Err(format!("colour {s:?} is not hex"));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("colour {s:?} is not hex"))
        };
        match hex.len() {
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(format!("colour {s:?} must be #rrggbb or #rrggbbaa")),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

/// Font selection for label text. Only the pixel size is configurable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub size_px: f32,
}

/// Measured extent of a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
}

/// A 2D drawing context aligned 1:1 with the video's pixel grid.
pub trait Surface {
    fn size(&self) -> SurfaceSize;

    /// Reallocates the surface. Contents after a resize are unspecified until
    /// the next `clear`.
    fn resize(&mut self, size: SurfaceSize);

    /// Wipes the whole surface back to fully transparent.
    fn clear(&mut self);

    /// Draws the outline of `rect`; the stroke is centred on its edges.
    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    fn measure_text(&self, text: &str, font: Font) -> TextMetrics;

    /// Draws `text` with its bottom-left corner at `origin`.
    fn fill_text(&mut self, text: &str, origin: Point, font: Font, color: Color);
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn size(&self) -> SurfaceSize {
        (**self).size()
    }
    fn resize(&mut self, size: SurfaceSize) {
        (**self).resize(size)
    }
    fn clear(&mut self) {
        (**self).clear()
    }
    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        (**self).stroke_rect(rect, color, line_width)
    }
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        (**self).fill_rect(rect, color)
    }
    fn measure_text(&self, text: &str, font: Font) -> TextMetrics {
        (**self).measure_text(text, font)
    }
    fn fill_text(&mut self, text: &str, origin: Point, font: Font, color: Color) {
        (**self).fill_text(text, origin, font, color)
    }
}

/// One primitive as issued to a `RecordingSurface`.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f32,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
    FillText {
        text: String,
        origin: Point,
        color: Color,
    },
}

/// Horizontal advance of one glyph, as a fraction of the font size.
/// Per-glyph advance as a fraction of the font size, 3/5.
const RECORDING_GLYPH_ADVANCE_NUM: f32 = 3.0;
const RECORDING_GLYPH_ADVANCE_DEN: f32 = 5.0;

/// A surface that remembers what was drawn on it since the last `clear`.
///
/// Text is measured with a fixed per-glyph advance so layouts are reproducible.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: SurfaceSize,
    commands: Vec<DrawCommand>,
    clears: u64,
}

impl RecordingSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            commands: Vec::new(),
            clears: 0,
        }
    }

    /// Everything drawn since the last clear, in issue order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// How many times the surface has been cleared, i.e. how many renders ran.
    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    /// The texts currently on the surface.
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.clears += 1;
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn measure_text(&self, text: &str, font: Font) -> TextMetrics {
        TextMetrics {
            width: text.chars().count() as f32 * font.size_px * RECORDING_GLYPH_ADVANCE_NUM / RECORDING_GLYPH_ADVANCE_DEN,
            height: font.size_px,
        }
    }

    fn fill_text(&mut self, text: &str, origin: Point, _font: Font, color: Color) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            origin,
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colours() {
        assert_eq!("#00ffff".parse::<Color>(), Ok(Color::CYAN));
        assert_eq!("#00000080".parse::<Color>(), Ok(Color::rgba(0, 0, 0, 0x80)));
        assert!("00ffff".parse::<Color>().is_err());
        assert!("#0fff".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
    }

    #[test]
    fn colour_display_round_trips_through_parse() {
        let c = Color::rgba(1, 2, 3, 4);
        assert_eq!(c.to_string().parse::<Color>(), Ok(c));
        assert_eq!(Color::CYAN.to_string(), "#00ffff");
    }

    #[test]
    fn recording_surface_forgets_on_clear() {
        let mut s = RecordingSurface::new(SurfaceSize::new(10, 10));
        s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::BLACK);
        assert_eq!(s.commands().len(), 1);
        s.clear();
        assert!(s.commands().is_empty());
        assert_eq!(s.clear_count(), 1);
    }

    #[test]
    fn recording_metrics_scale_with_font() {
        let s = RecordingSurface::new(SurfaceSize::new(10, 10));
        let m = s.measure_text("abcde", Font { size_px: 10.0 });
        assert_eq!(m, TextMetrics { width: 30.0, height: 10.0 });
        let m = s.measure_text("person 97.00", Font { size_px: 20.0 });
        assert_eq!(m, TextMetrics { width: 144.0, height: 20.0 });
    }
}
