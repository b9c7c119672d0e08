// THEORY:
// `ImageSurface` is the in-memory overlay: a transparent RGBA image the same size
// as the configured display surface. It is what a headless host renders into,
// and it can be composited over the frame it annotates for inspection.
//
// Rasterization rules:
// 1.  Shapes are kept in full, unclipped geometry up to the point of writing
//     pixels; only the individual pixels that land outside the buffer are skipped.
// 2.  A pixel is covered when its centre lies inside the shape.
// 3.  Colours are blended source-over, so a translucent label background lets
//     the outline underneath show through.
// 4.  Text uses the built-in 5x7 font scaled by an integer factor derived from
//     the font size (16px -> 2x).

use crate::glyphs::{self, CELL_HEIGHT, CELL_WIDTH, GLYPH_COLUMNS, GLYPH_ROWS};
use crate::surface::{Color, Font, Point, Rect, Surface, SurfaceSize, TextMetrics};
use image::{ImageResult, Rgba, RgbaImage};
use std::path::Path;

pub struct ImageSurface {
    image: RgbaImage,
}

impl ImageSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            image: RgbaImage::new(size.width, size.height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Number of pixels that are not fully transparent.
    pub fn painted_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p.0[3] != 0).count()
    }

    /// Blends the overlay onto a copy of `frame`, pixel for pixel from the
    /// top-left corner. Sizes are not reconciled; the overlap is composited.
    pub fn composite_onto(&self, frame: &RgbaImage) -> RgbaImage {
        let mut out = frame.clone();
        let width = out.width().min(self.image.width());
        let height = out.height().min(self.image.height());
        for y in 0..height {
            for x in 0..width {
                let src = self.image.get_pixel(x, y).0;
                if src[3] == 0 {
                    continue;
                }
                blend(out.get_pixel_mut(x, y), Color::rgba(src[0], src[1], src[2], src[3]));
            }
        }
        out
    }

    pub fn save_png(&self, path: &Path) -> ImageResult<()> {
        self.image.save(path)
    }

    fn glyph_scale(font: Font) -> f32 {
        (font.size_px / CELL_HEIGHT as f32).round().max(1.0)
    }

    /// Fills every pixel whose centre lies inside `[x0, x1) x [y0, y1)`.
    fn fill_span(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Color) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let px0 = ((x0 - 0.5).ceil() as i64).max(0);
        let px1 = ((x1 - 0.5).ceil() as i64).min(w);
        let py0 = ((y0 - 0.5).ceil() as i64).max(0);
        let py1 = ((y1 - 0.5).ceil() as i64).min(h);
        for y in py0..py1 {
            for x in px0..px1 {
                blend(self.image.get_pixel_mut(x as u32, y as u32), color);
            }
        }
    }
}

impl Surface for ImageSurface {
    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.image.width(), self.image.height())
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.image = RgbaImage::new(size.width, size.height);
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        let half = line_width / 2.0;
        let (left, top) = (rect.x - half, rect.y - half);
        let (right, bottom) = (rect.x + rect.width + half, rect.y + rect.height + half);

        // Top and bottom bands span the full outer width; the side bands fill
        // the rows between them.
        self.fill_span(left, top, right, top + line_width, color);
        self.fill_span(left, bottom - line_width, right, bottom, color);
        if bottom - line_width > top + line_width {
            self.fill_span(left, top + line_width, left + line_width, bottom - line_width, color);
            self.fill_span(right - line_width, top + line_width, right, bottom - line_width, color);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.fill_span(rect.x, rect.y, rect.x + rect.width, rect.y + rect.height, color);
    }

    fn measure_text(&self, text: &str, font: Font) -> TextMetrics {
        let scale = Self::glyph_scale(font);
        TextMetrics {
            width: (text.chars().count() * CELL_WIDTH) as f32 * scale,
            height: CELL_HEIGHT as f32 * scale,
        }
    }

    fn fill_text(&mut self, text: &str, origin: Point, font: Font, color: Color) {
        let scale = Self::glyph_scale(font);
        let top = origin.y - CELL_HEIGHT as f32 * scale;
        for (i, c) in text.chars().enumerate() {
            let cell_left = origin.x + (i * CELL_WIDTH) as f32 * scale;
            for (col, bits) in glyphs::glyph(c).iter().enumerate().take(GLYPH_COLUMNS) {
                for row in 0..GLYPH_ROWS {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    let x = cell_left + col as f32 * scale;
                    let y = top + row as f32 * scale;
                    self.fill_span(x, y, x + scale, y + scale, color);
                }
            }
        }
    }
}

/// Source-over blend of `src` onto `dst`.
fn blend(dst: &mut Rgba<u8>, src: Color) {
    let sa = src.a as u32;
    if sa == 255 {
        *dst = Rgba([src.r, src.g, src.b, 255]);
        return;
    }
    let inv = 255 - sa;
    let [dr, dg, db, da] = dst.0;
    let out_a = sa + da as u32 * inv / 255;
    if out_a == 0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    let mix = |s: u8, d: u8| -> u8 {
        let premul = s as u32 * sa + d as u32 * da as u32 * inv / 255;
        (premul / out_a).min(255) as u8
    };
    *dst = Rgba([mix(src.r, dr), mix(src.g, dg), mix(src.b, db), out_a.min(255) as u8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::Prediction;
    use crate::renderer::{OverlayRenderer, OverlayStyle};

    fn surface() -> ImageSurface {
        ImageSurface::new(SurfaceSize::new(64, 48))
    }

    #[test]
    fn fill_rect_covers_exact_pixels() {
        let mut s = surface();
        s.fill_rect(Rect::new(2.0, 3.0, 4.0, 5.0), Color::CYAN);
        assert_eq!(s.painted_pixels(), 20);
        assert_eq!(s.image().get_pixel(2, 3).0, [0, 255, 255, 255]);
        assert_eq!(s.image().get_pixel(5, 7).0, [0, 255, 255, 255]);
        assert_eq!(s.image().get_pixel(6, 7).0[3], 0);
    }

    #[test]
    fn off_surface_shapes_do_not_panic() {
        let mut s = surface();
        s.fill_rect(Rect::new(-100.0, -100.0, 50.0, 50.0), Color::CYAN);
        s.stroke_rect(Rect::new(60.0, 40.0, 100.0, 100.0), Color::CYAN, 4.0);
        s.fill_text("far away", Point::new(1000.0, 1000.0), Font { size_px: 16.0 }, Color::BLACK);
        s.fill_text("edge", Point::new(-5.0, 3.0), Font { size_px: 16.0 }, Color::BLACK);
        // Only the part of the stroke that overlaps the buffer is painted.
        assert!(s.painted_pixels() > 0);
    }

    #[test]
    fn stroke_leaves_interior_untouched() {
        let mut s = surface();
        s.stroke_rect(Rect::new(10.0, 10.0, 20.0, 20.0), Color::CYAN, 2.0);
        assert_eq!(s.image().get_pixel(9, 9).0[3], 255);
        assert_eq!(s.image().get_pixel(20, 20).0[3], 0);
        assert_eq!(s.image().get_pixel(30, 20).0[3], 255);
    }

    #[test]
    fn clear_wipes_everything() {
        let mut s = surface();
        s.fill_rect(Rect::new(0.0, 0.0, 64.0, 48.0), Color::CYAN);
        s.clear();
        assert_eq!(s.painted_pixels(), 0);
    }

    #[test]
    fn text_metrics_scale_with_font_size() {
        let s = surface();
        let small = s.measure_text("ab", Font { size_px: 8.0 });
        let large = s.measure_text("ab", Font { size_px: 16.0 });
        assert_eq!(small, TextMetrics { width: 12.0, height: 8.0 });
        assert_eq!(large, TextMetrics { width: 24.0, height: 16.0 });
    }

    #[test]
    fn text_sits_above_its_origin() {
        let mut s = surface();
        s.fill_text("1", Point::new(10.0, 30.0), Font { size_px: 8.0 }, Color::BLACK);
        let painted_rows: Vec<u32> = (0..48)
            .filter(|y| (0..64).any(|x| s.image().get_pixel(x, *y).0[3] != 0))
            .collect();
        assert_eq!(painted_rows.first(), Some(&22));
        assert!(painted_rows.iter().all(|y| *y < 30));
    }

    #[test]
    fn translucent_fill_blends_over_existing_paint() {
        let mut s = surface();
        s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::rgb(255, 0, 0));
        s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::rgba(0, 0, 255, 128));
        let p = s.image().get_pixel(0, 0).0;
        assert_eq!(p[3], 255);
        assert!(p[0] > 100 && p[2] > 100);
    }

    #[test]
    fn composite_keeps_frame_where_overlay_is_clear() {
        let mut s = surface();
        s.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::CYAN);
        let frame = RgbaImage::from_pixel(64, 48, Rgba([10, 20, 30, 255]));
        let out = s.composite_onto(&frame);
        assert_eq!(out.get_pixel(0, 0).0, [0, 255, 255, 255]);
        assert_eq!(out.get_pixel(10, 10).0, [10, 20, 30, 255]);
    }

    #[test]
    fn renderer_draws_through_image_surface() {
        let mut r = OverlayRenderer::new(surface(), OverlayStyle::default());
        r.render(&[Prediction::new("cat", 0.5, [8.0, 24.0, 20.0, 10.0])]);
        assert!(r.surface().painted_pixels() > 0);
        r.render(&[]);
        assert_eq!(r.surface().painted_pixels(), 0);
    }
}
