// A stand-in camera for machines without one: a bright square bouncing across a
// dark background. Like a real device it produces frames at its own rate on its
// own thread, and each frame advances the animation by one step.

use crate::threaded::{BlockingReader, ThreadedSource};
use async_trait::async_trait;
use live_overlay::{CameraAccess, CameraConstraints, CameraError, Frame, SurfaceSize};
use std::time::{Duration, Instant};
use tracing::info;

const BACKGROUND: [u8; 4] = [24, 24, 28, 255];
const SQUARE: [u8; 4] = [235, 235, 220, 255];
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub struct SyntheticCamera {
    size: SurfaceSize,
    deny: bool,
}

impl SyntheticCamera {
    pub fn new(size: SurfaceSize, deny: bool) -> Self {
        Self { size, deny }
    }
}

#[async_trait]
impl CameraAccess for SyntheticCamera {
    type Source = ThreadedSource;

    async fn request(&mut self, constraints: &CameraConstraints) -> Result<ThreadedSource, CameraError> {
        if self.deny {
            return Err(CameraError::PermissionDenied);
        }
        info!(facing = ?constraints.facing, "synthetic camera granted");
        let size = self.size;
        ThreadedSource::open("synthetic-camera", move || Ok(SyntheticReader::new(size, FRAME_INTERVAL))).await
    }
}

pub struct SyntheticReader {
    width: u32,
    height: u32,
    step: u32,
    interval: Duration,
    next_due: Option<Instant>,
}

impl SyntheticReader {
    pub fn new(size: SurfaceSize, interval: Duration) -> Self {
        Self {
            width: size.width,
            height: size.height,
            step: 0,
            interval,
            next_due: None,
        }
    }

    /// Top-left corner and side length of the square at animation step `step`.
    fn square_at(&self, step: u32) -> (u32, u32, u32) {
        let side = (self.width.min(self.height) / 6).max(1);
        let travel_x = self.width.saturating_sub(side).max(1);
        let travel_y = self.height.saturating_sub(side).max(1);
        let speed = u64::from((side / 4).max(1));
        let travel = u64::from(step) * speed;
        (bounce(travel, travel_x), bounce(travel / 2, travel_y), side)
    }

    fn render(&self, step: u32) -> Vec<u8> {
        let (sx, sy, side) = self.square_at(step);
        let mut data = Vec::with_capacity(Frame::rgba_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                let inside = x >= sx && x < sx + side && y >= sy && y < sy + side;
                data.extend_from_slice(if inside { &SQUARE } else { &BACKGROUND });
            }
        }
        data
    }
}

impl BlockingReader for SyntheticReader {
    fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.interval);
        let frame = Frame::new(self.width, self.height, self.render(self.step));
        self.step = self.step.wrapping_add(1);
        Ok(Some(frame))
    }
}

/// Ping-pong `position` within `[0, range]`.
fn bounce(position: u64, range: u32) -> u32 {
    let range = u64::from(range);
    let period = range * 2;
    let p = position % period;
    // Both arms are at most `range`, which came from a u32.
    (if p <= range { p } else { period - p }) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_overlay::FrameSource;

    #[test]
    fn bounce_reflects_at_the_edges() {
        assert_eq!(bounce(0, 10), 0);
        assert_eq!(bounce(10, 10), 10);
        assert_eq!(bounce(13, 10), 7);
        assert_eq!(bounce(20, 10), 0);
    }

    #[test]
    fn square_stays_on_screen_at_any_step() {
        let source = SyntheticReader::new(SurfaceSize::new(1920, 1080), Duration::ZERO);
        for step in [0, 1, u32::MAX / 2, u32::MAX - 1, u32::MAX] {
            let (x, y, side) = source.square_at(step);
            assert!(x + side <= 1920);
            assert!(y + side <= 1080);
        }
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut reader = SyntheticReader::new(SurfaceSize::new(120, 90), Duration::ZERO);
        let a = reader.read().unwrap().unwrap();
        let b = reader.read().unwrap().unwrap();
        assert_eq!(a.data.len(), 120 * 90 * 4);
        assert_ne!(a.data, b.data);
    }

    #[tokio::test]
    async fn denied_camera_reports_permission_error() {
        let mut camera = SyntheticCamera::new(SurfaceSize::new(10, 10), true);
        let err = camera.request(&CameraConstraints::default()).await.err();
        assert_eq!(err, Some(CameraError::PermissionDenied));
    }

    #[tokio::test]
    async fn granted_camera_streams_frames_of_the_configured_size() {
        let mut camera = SyntheticCamera::new(SurfaceSize::new(60, 40), false);
        let mut source = camera.request(&CameraConstraints::default()).await.ok().unwrap();
        let metadata = source.metadata_loaded().await.unwrap();
        assert_eq!((metadata.width, metadata.height), (60, 40));
        let frame = source.current_frame().unwrap();
        assert_eq!(frame.data.len(), Frame::rgba_len(60, 40));
    }
}
