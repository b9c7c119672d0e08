// THEORY:
// A `Prediction` is the only thing the detector hands back to the engine. It is
// a "dumb" data container: a class label, a confidence score and an axis-aligned
// bounding box in the pixel space of the frame that produced it. Predictions are
// produced fresh on every detect call, never stored, and kept in whatever order
// the detector emitted them.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel units. `x`/`y` address the top-left corner.
///
/// Values are taken as-is from the detector: they may be fractional, negative
/// or extend beyond the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self { x, y, width, height }
    }
}

/// A single object-detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// The class label reported by the detector, e.g. `"person"`.
    pub class: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    /// Where the object is, in frame pixels.
    pub bbox: BoundingBox,
}

impl Prediction {
    pub fn new(class: impl Into<String>, score: f32, bbox: impl Into<BoundingBox>) -> Self {
        Self {
            class: class.into(),
            score,
            bbox: bbox.into(),
        }
    }

    /// The text drawn next to the box: the class followed by the score as a
    /// percentage with exactly two decimals (`"person 83.40"`).
    pub fn label(&self) -> String {
        format!("{} {}", self.class, format_percent(self.score))
    }
}

/// Formats a `[0, 1]` score as a percentage with two decimals, trailing zeros kept.
///
/// Rounds half away from zero on the decimal value the score was written as.
pub fn format_percent(score: f32) -> String {
    let hundredths = f64::from(score) * 10_000.0;
    // Widening 0.8345f32 gives 8344.9999...; snap away the f32 noise first.
    let snapped = (hundredths * 100.0).round() / 100.0;
    format!("{:.2}", snapped.round() / 100.0)
}
