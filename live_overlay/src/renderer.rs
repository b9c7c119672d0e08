// THEORY:
// The `OverlayRenderer` turns one tick's predictions into pixels. Every render is
// a full clear followed by a redraw, so the surface only ever shows the result
// of a single detect call and a render can never be half-applied.
//
// Drawing order for each prediction, in list order:
// 1.  **Outline**: the bounding box stroked exactly where the detector put it.
// 2.  **Label background**: a filled block sitting on top of the outline's
//     top-left corner, as wide and tall as the measured label plus padding.
// 3.  **Label text**: `"<class> <score%>"` anchored at the box's top-left corner,
//     which with a bottom-left text anchor places it inside the background.
//
// Known limitation: boxes are neither clipped to the surface nor rescaled when
// the frame's native resolution differs from the surface size.

use crate::prediction::Prediction;
use crate::surface::{Color, Font, Point, Rect, Surface, SurfaceSize};

/// Fixed visual parameters of the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub stroke_color: Color,
    pub line_width: f32,
    pub label_background: Color,
    pub text_color: Color,
    pub font: Font,
    /// Added to both the measured width and height of the label.
    pub label_padding: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_color: Color::CYAN,
            line_width: 4.0,
            label_background: Color::CYAN,
            text_color: Color::BLACK,
            font: Font { size_px: 16.0 },
            label_padding: 4.0,
        }
    }
}

/// Draws predictions as labelled rectangles onto a surface it owns.
pub struct OverlayRenderer<S: Surface> {
    surface: S,
    style: OverlayStyle,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, style: OverlayStyle) -> Self {
        Self { surface, style }
    }

    /// Clears the surface and draws every prediction in order.
    pub fn render(&mut self, predictions: &[Prediction]) {
        self.surface.clear();
        for prediction in predictions {
            self.draw_prediction(prediction);
        }
    }

    fn draw_prediction(&mut self, prediction: &Prediction) {
        let bbox = prediction.bbox;
        let style = &self.style;

        // --- 1. Outline ---
        self.surface.stroke_rect(
            Rect::new(bbox.x, bbox.y, bbox.width, bbox.height),
            style.stroke_color,
            style.line_width,
        );

        // --- 2. Label background ---
        let label = prediction.label();
        let metrics = self.surface.measure_text(&label, style.font);
        let background_width = metrics.width + style.label_padding;
        let background_height = metrics.height + style.label_padding;
        self.surface.fill_rect(
            Rect::new(bbox.x, bbox.y - background_height, background_width, background_height),
            style.label_background,
        );

        // --- 3. Label text ---
        self.surface
            .fill_text(&label, Point::new(bbox.x, bbox.y), style.font, style.text_color);
    }

    /// Applies an explicit resize notification to the owned surface.
    pub fn resize(&mut self, size: SurfaceSize) {
        if self.surface.size() != size {
            self.surface.resize(size);
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}
