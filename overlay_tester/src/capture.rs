// THEORY:
// Live mode: a real capture device, an OpenCV drawing surface and a preview
// window. Three pieces share two `Mat`s:
//
// 1.  **OpenCvReader** reads the device on its own capture thread (see
//     `threaded`); it keeps the latest BGR frame for the preview and publishes
//     an RGBA copy for the detection loop.
// 2.  **MatSurface** is the overlay, a BGRA `Mat` where alpha 0 means "nothing
//     drawn". The loop renders into it from its own task.
// 3.  **The preview** (on the main thread, where highgui wants to live) copies
//     the latest frame, stamps every painted overlay pixel on top, and shows it.
//
// The frame size reported by the device is the overlay size, so boxes map 1:1.
// If the device changes resolution mid-stream the preview reports it to the
// loop as a resize.

use crate::motion_detector::{MotionConfig, MotionModel};
use crate::threaded::{BlockingReader, ThreadedSource};
use crate::ConsoleNotifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use live_overlay::{
    CameraAccess, CameraConstraints, CameraError, Color, DetectionLoop, Font, Frame, InitializationCoordinator,
    IntervalClock, OverlayConfig, OverlayRenderer, Point, Rect, Surface, SurfaceSize, TextMetrics,
};
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const WINDOW: &str = "Live Overlay";
const PREVIEW_INTERVAL: Duration = Duration::from_millis(15);
const KEY_ESC: i32 = 27;
const FONT_FACE: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
/// Approximate cap height, in pixels, of `FONT_FACE` at scale 1.0.
const FONT_BASE_PX: f64 = 22.0;

type SharedMat = Arc<Mutex<Mat>>;

fn stream_error(err: opencv::Error) -> CameraError {
    CameraError::Stream(err.to_string())
}

pub struct OpenCvCamera {
    index: i32,
    latest: SharedMat,
}

#[async_trait]
impl CameraAccess for OpenCvCamera {
    type Source = ThreadedSource;

    async fn request(&mut self, constraints: &CameraConstraints) -> Result<ThreadedSource, CameraError> {
        // Device indices carry no facing information; the request is logged so
        // the choice is visible.
        info!(index = self.index, facing = ?constraints.facing, "opening capture device");
        let (index, latest) = (self.index, Arc::clone(&self.latest));
        ThreadedSource::open("opencv-capture", move || OpenCvReader::open(index, latest)).await
    }
}

/// Owns the `VideoCapture`; lives on the capture thread for its whole life.
pub struct OpenCvReader {
    capture: VideoCapture,
    latest: SharedMat,
}

impl OpenCvReader {
    fn open(index: i32, latest: SharedMat) -> Result<Self, CameraError> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(stream_error)?;
        if !capture.is_opened().map_err(stream_error)? {
            return Err(CameraError::NotFound(format!("no capture device at index {index}")));
        }
        Ok(Self { capture, latest })
    }

    /// Reads the next device frame, keeping the BGR original for the preview.
    fn grab(&mut self) -> Result<Option<Frame>, opencv::Error> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            return Ok(None);
        }
        let mut rgba = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)?;
        let frame = Frame::new(bgr.cols() as u32, bgr.rows() as u32, rgba.data_bytes()?.to_vec());
        if let Ok(mut latest) = self.latest.lock() {
            *latest = bgr;
        }
        Ok(Some(frame))
    }
}

impl BlockingReader for OpenCvReader {
    fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        self.grab().map_err(stream_error)
    }
}

/// Overlay surface drawn with OpenCV primitives into a shared BGRA `Mat`.
pub struct MatSurface {
    size: SurfaceSize,
    canvas: SharedMat,
}

impl MatSurface {
    pub fn new(size: SurfaceSize, canvas: SharedMat) -> Result<Self, opencv::Error> {
        let blank = blank_canvas(size)?;
        if let Ok(mut shared) = canvas.lock() {
            *shared = blank;
        }
        Ok(Self { size, canvas })
    }

    fn draw(&self, op: &str, f: impl FnOnce(&mut Mat) -> opencv::Result<()>) {
        let Ok(mut canvas) = self.canvas.lock() else {
            warn!(op, "overlay canvas lock poisoned");
            return;
        };
        if let Err(err) = f(&mut canvas) {
            warn!(op, error = %err, "overlay draw failed");
        }
    }
}

fn blank_canvas(size: SurfaceSize) -> opencv::Result<Mat> {
    Mat::new_rows_cols_with_default(size.height as i32, size.width as i32, core::CV_8UC4, Scalar::all(0.0))
}

fn scalar(color: Color) -> Scalar {
    Scalar::new(color.b as f64, color.g as f64, color.r as f64, color.a as f64)
}

fn cv_rect(rect: Rect) -> core::Rect {
    core::Rect::new(
        rect.x.round() as i32,
        rect.y.round() as i32,
        rect.width.round() as i32,
        rect.height.round() as i32,
    )
}

fn font_scale(font: Font) -> f64 {
    font.size_px as f64 / FONT_BASE_PX
}

fn font_thickness(font: Font) -> i32 {
    ((font.size_px / 16.0).round() as i32).max(1)
}

impl Surface for MatSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
        self.draw("resize", |canvas| {
            *canvas = blank_canvas(size)?;
            Ok(())
        });
    }

    fn clear(&mut self) {
        let size = self.size;
        self.draw("clear", |canvas| {
            *canvas = blank_canvas(size)?;
            Ok(())
        });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        let thickness = (line_width.round() as i32).max(1);
        self.draw("stroke_rect", |canvas| {
            imgproc::rectangle(canvas, cv_rect(rect), scalar(color), thickness, imgproc::LINE_8, 0)
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.draw("fill_rect", |canvas| {
            imgproc::rectangle(canvas, cv_rect(rect), scalar(color), imgproc::FILLED, imgproc::LINE_8, 0)
        });
    }

    fn measure_text(&self, text: &str, font: Font) -> TextMetrics {
        let mut baseline = 0;
        match imgproc::get_text_size(text, FONT_FACE, font_scale(font), font_thickness(font), &mut baseline) {
            Ok(size) => TextMetrics {
                width: size.width as f32,
                height: size.height as f32,
            },
            Err(err) => {
                warn!(error = %err, "text measurement failed");
                TextMetrics::default()
            }
        }
    }

    fn fill_text(&mut self, text: &str, origin: Point, font: Font, color: Color) {
        let org = core::Point::new(origin.x.round() as i32, origin.y.round() as i32);
        self.draw("fill_text", |canvas| {
            imgproc::put_text(
                canvas,
                text,
                org,
                FONT_FACE,
                font_scale(font),
                scalar(color),
                font_thickness(font),
                imgproc::LINE_AA,
                false,
            )
        });
    }
}

/// Copies the latest frame into `display` and stamps the painted overlay
/// pixels over it. Returns the frame size, or `None` before the first frame.
fn compose(latest: &SharedMat, overlay: &SharedMat, display: &mut Mat) -> Result<Option<SurfaceSize>> {
    {
        let frame = latest.lock().map_err(|_| anyhow::anyhow!("frame lock poisoned"))?;
        if frame.empty() {
            return Ok(None);
        }
        frame.copy_to(display)?;
    }
    let frame_size = SurfaceSize::new(display.cols() as u32, display.rows() as u32);

    let overlay = overlay.lock().map_err(|_| anyhow::anyhow!("overlay lock poisoned"))?;
    if overlay.cols() != display.cols() || overlay.rows() != display.rows() {
        // A resize is pending; show the bare frame until the loop catches up.
        return Ok(Some(frame_size));
    }
    let mut alpha = Mat::default();
    core::extract_channel(&*overlay, &mut alpha, 3)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&*overlay, &mut bgr, imgproc::COLOR_BGRA2BGR, 0)?;
    bgr.copy_to_masked(display, &alpha)?;
    Ok(Some(frame_size))
}

pub async fn run(index: i32, config: &OverlayConfig, motion: MotionConfig) -> Result<()> {
    // --- 1. Initialization ---
    let latest: SharedMat = Arc::new(Mutex::new(Mat::default()));
    let overlay: SharedMat = Arc::new(Mutex::new(Mat::default()));
    let camera = OpenCvCamera {
        index,
        latest: Arc::clone(&latest),
    };
    let mut coordinator = InitializationCoordinator::new(config.camera_constraints(), ConsoleNotifier);
    let ready = coordinator
        .initialize(camera, MotionModel::new(motion))
        .await
        .context("overlay did not start")?;

    // --- 2. Loop Task ---
    let size = SurfaceSize::new(ready.metadata.width, ready.metadata.height);
    let surface = MatSurface::new(size, Arc::clone(&overlay))?;
    let renderer = OverlayRenderer::new(surface, config.style.clone());
    let mut lp = DetectionLoop::new(
        ready.source,
        ready.detector,
        renderer,
        IntervalClock::new(config.refresh_hz),
        config.loop_options(),
    );
    let mut handle = lp.handle();
    let task = tokio::spawn(async move { lp.run().await });

    // --- 3. Preview ---
    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
    let mut display = Mat::default();
    let mut current = size;
    while !handle.is_stop_requested() {
        if let Some(frame_size) = compose(&latest, &overlay, &mut display)? {
            if frame_size != current {
                info!(width = frame_size.width, height = frame_size.height, "capture size changed");
                handle.resize(frame_size);
                current = frame_size;
            }
            highgui::imshow(WINDOW, &display)?;
        }
        let key = highgui::wait_key(1)?;
        if key == 'q' as i32 || key == KEY_ESC {
            info!("stopped by user");
            handle.stop();
        }
        tokio::time::sleep(PREVIEW_INTERVAL).await;
    }

    // --- 4. Shutdown ---
    handle.stopped().await;
    let stats = task.await.context("detection loop task failed")?;
    info!(ticks = stats.ticks, rendered = stats.rendered, failed = stats.failed, "detection loop stopped");
    highgui::destroy_all_windows()?;
    Ok(())
}
