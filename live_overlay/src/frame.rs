// THEORY:
// The camera is an external capability. The engine never opens devices itself;
// it asks a `CameraAccess` for a stream, waits for that stream to report its
// first metadata, and from then on only ever samples the *current* frame.
//
// Key principles:
// 1.  **Ephemeral frames**: a `Frame` is the most recent image and nothing more.
//     No buffering, no history. Pixel data sits behind an `Arc` so handing the
//     same frame to an in-flight detect call is a pointer copy.
// 2.  **Two-step readiness**: permission grant (`request`) and first metadata
//     (`metadata_loaded`) are distinct signals, mirroring how real capture
//     stacks behave. The coordinator treats the pair as "camera ready".

use crate::error::CameraError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

/// A single RGBA8 image sampled from the live stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA bytes, `width * height * 4` long.
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            captured_at: Instant::now(),
        }
    }

    /// A uniformly black frame, handy for detectors that ignore pixels.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0u8; Self::rgba_len(width, height)])
    }

    /// Byte length of a tightly packed RGBA buffer of the given size.
    pub fn rgba_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Away from the user (rear camera on phones).
    #[default]
    Environment,
    /// Towards the user.
    User,
}

/// Preferences passed along with a camera access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraConstraints {
    pub facing: FacingMode,
}

/// What the stream reported once its metadata loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Native frame width. Not used to scale predictions.
    pub width: u32,
    pub height: u32,
}

/// A live stream attached to the view.
#[async_trait]
pub trait FrameSource: Send {
    /// Resolves once the stream's first metadata has loaded.
    async fn metadata_loaded(&mut self) -> Result<StreamMetadata, CameraError>;

    /// The frame currently on screen, if the stream has one.
    fn current_frame(&mut self) -> Option<Frame>;
}

/// Grants (or refuses) access to a camera.
#[async_trait]
pub trait CameraAccess: Send {
    type Source: FrameSource + 'static;

    async fn request(&mut self, constraints: &CameraConstraints) -> Result<Self::Source, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_is_tightly_packed() {
        let frame = Frame::blank(3, 2);
        assert_eq!(frame.data.len(), 24);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn buffer_length_does_not_wrap_for_large_frames() {
        assert_eq!(Frame::rgba_len(70_000, 70_000), 19_600_000_000);
    }

    #[test]
    fn default_facing_is_environment() {
        assert_eq!(CameraConstraints::default().facing, FacingMode::Environment);
    }
}
