// THEORY:
// This file is the entry point for the `live_overlay` library crate. It defines
// the public API used by whatever hosts the overlay (the `overlay_tester`
// harness, or an embedding application with its own camera and model).
//
// The crate is organised around the three moving parts of a live detection
// overlay, leaves first:
// 1.  **Capabilities** (`frame`, `detector`, `clock`, `surface`): traits for the
//     external camera, model, refresh signal and drawing context.
// 2.  **InitializationCoordinator** (`coordinator`): waits for camera and model
//     readiness before anything runs.
// 3.  **DetectionLoop** (`detection_loop`): one tick per refresh, detect calls in
//     flight concurrently, results applied in request order.
// 4.  **OverlayRenderer** (`renderer`): clear-then-draw of labelled boxes.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod detection_loop;
pub mod detector;
pub mod error;
pub mod frame;
mod glyphs;
pub mod image_surface;
pub mod prediction;
pub mod renderer;
pub mod surface;

pub use clock::{IntervalClock, ManualClock, RefreshClock, RefreshTrigger};
pub use config::OverlayConfig;
pub use coordinator::{InitializationCoordinator, Notifier, Readiness, Ready};
pub use detection_loop::{
    DetectionLoop, LoopHandle, LoopOptions, LoopState, LoopStats, OrderingPolicy, SequenceGate, SequenceNumber,
};
pub use detector::{DetectOutcome, Detector, ModelLoader};
pub use error::{CameraError, ConfigError, DetectError, InitError, ModelLoadError};
pub use frame::{CameraAccess, CameraConstraints, FacingMode, Frame, FrameSource, StreamMetadata};
pub use image_surface::ImageSurface;
pub use prediction::{BoundingBox, Prediction};
pub use renderer::{OverlayRenderer, OverlayStyle};
pub use surface::{Color, DrawCommand, Font, Point, RecordingSurface, Rect, Surface, SurfaceSize, TextMetrics};
