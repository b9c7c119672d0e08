// THEORY:
// The harness needs *some* model behind the `Detector` trait. This one is a
// small chunk-grid motion detector: it needs no weights, runs anywhere, and
// produces boxes that move, which is all the overlay needs to be exercised.
//
// Algorithm, per frame:
// 1.  **Chunking**: slice the RGBA frame into a grid of fixed-size chunks and
//     reduce each chunk to its mean Rec. 601 luminance.
// 2.  **Temporal delta**: compare every chunk with the same chunk of the
//     previously analysed frame. A chunk whose luminance moved by more than the
//     threshold is "active".
// 3.  **Region growing**: flood-fill 4-connected active chunks into blobs.
// 4.  **Reporting**: each blob big enough becomes a `Prediction` of class
//     `"motion"`, boxed in frame pixels, scored by how densely its bounding box
//     is filled with active chunks.
//
// Analysis runs on tokio's blocking pool, gated by a semaphore sized to the CPU
// count. An optional artificial latency that varies per call makes concurrent
// calls finish out of order, which is exactly what the loop must cope with.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use live_overlay::{DetectError, DetectOutcome, Detector, Frame, ModelLoadError, ModelLoader, Prediction};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

const LUMINANCE_THRESHOLD: f32 = 12.0;
const MIN_BLOB_CHUNKS: usize = 2;
const MOTION_CLASS: &str = "motion";

/// Tunables for the motion detector.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    pub chunk_width: u32,
    pub chunk_height: u32,
    /// Base artificial latency added to every call. Zero disables it.
    pub latency: Duration,
    /// How long "loading the model" takes.
    pub load_delay: Duration,
    /// Makes `load` fail, to exercise the model-failure path.
    pub fail_load: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            chunk_width: 16,
            chunk_height: 16,
            latency: Duration::ZERO,
            load_delay: Duration::from_millis(200),
            fail_load: false,
        }
    }
}

pub struct MotionModel {
    config: MotionConfig,
}

impl MotionModel {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for MotionModel {
    type Model = MotionDetector;

    async fn load(self) -> Result<MotionDetector, ModelLoadError> {
        tokio::time::sleep(self.config.load_delay).await;
        if self.config.fail_load {
            return Err(ModelLoadError("motion model load was configured to fail".into()));
        }
        if self.config.chunk_width == 0 || self.config.chunk_height == 0 {
            return Err(ModelLoadError("chunk dimensions must be non-zero".into()));
        }
        Ok(MotionDetector::new(self.config))
    }
}

/// Mean luminance per chunk of an analysed frame.
#[derive(Debug, Clone, PartialEq)]
struct LuminanceGrid {
    grid_width: u32,
    grid_height: u32,
    values: Vec<f32>,
    captured_at: Instant,
    /// What this frame was found to contain when it was analysed.
    predictions: Vec<Prediction>,
}

type SharedGrid = Arc<Mutex<Option<LuminanceGrid>>>;

pub struct MotionDetector {
    config: MotionConfig,
    previous: SharedGrid,
    workers: Arc<Semaphore>,
    calls: AtomicU64,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            previous: Arc::new(Mutex::new(None)),
            workers: Arc::new(Semaphore::new(num_cpus::get().max(1))),
            calls: AtomicU64::new(0),
        }
    }

    /// Latency for call `n`: cycles through 1x, 3x and 2x the base latency so
    /// neighbouring calls overtake each other.
    fn latency_for(&self, n: u64) -> Duration {
        const PATTERN: [u32; 3] = [1, 3, 2];
        self.config.latency * PATTERN[(n % 3) as usize]
    }
}

impl Detector for MotionDetector {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, DetectOutcome> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency_for(n);
        let previous = Arc::clone(&self.previous);
        let workers = Arc::clone(&self.workers);
        let (chunk_width, chunk_height) = (self.config.chunk_width, self.config.chunk_height);

        async move {
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|_| DetectError("detector shut down".into()))?;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let predictions = tokio::task::spawn_blocking(move || analyse(&previous, &frame, chunk_width, chunk_height))
                .await
                .map_err(|err| DetectError(format!("motion analysis task failed: {err}")))??;
            debug!(call = n, count = predictions.len(), "motion analysed");
            Ok::<_, DetectError>(predictions)
        }
        .boxed()
    }
}

fn lock(previous: &SharedGrid) -> Result<MutexGuard<'_, Option<LuminanceGrid>>, DetectError> {
    previous
        .lock()
        .map_err(|_| DetectError("motion state poisoned".into()))
}

/// Compares `frame` with the newest frame analysed so far. Calls overlap, so a
/// frame may finish after a newer one; it never replaces that newer reference.
/// A camera slower than the display hands out the same frame more than once;
/// repeats get the answer of the first analysis.
fn analyse(previous: &SharedGrid, frame: &Frame, chunk_width: u32, chunk_height: u32) -> Result<Vec<Prediction>, DetectError> {
    if let Some(prev) = lock(previous)?.as_ref() {
        if prev.captured_at == frame.captured_at {
            return Ok(prev.predictions.clone());
        }
    }

    let mut grid = luminance_grid(frame, chunk_width, chunk_height);
    let mut last = lock(previous)?;
    let predictions = match last.as_ref() {
        Some(prev) if prev.grid_width == grid.grid_width && prev.grid_height == grid.grid_height => {
            find_motion(prev, &grid, chunk_width, chunk_height)
        }
        _ => Vec::new(),
    };
    if last.as_ref().is_none_or(|prev| prev.captured_at < grid.captured_at) {
        grid.predictions = predictions.clone();
        *last = Some(grid);
    }
    Ok(predictions)
}

fn luminance_grid(frame: &Frame, chunk_width: u32, chunk_height: u32) -> LuminanceGrid {
    let grid_width = frame.width / chunk_width;
    let grid_height = frame.height / chunk_height;
    let mut values = Vec::with_capacity(grid_width as usize * grid_height as usize);

    for gy in 0..grid_height {
        for gx in 0..grid_width {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for y in gy * chunk_height..(gy + 1) * chunk_height {
                let row = y as usize * frame.width as usize * 4;
                for x in gx * chunk_width..(gx + 1) * chunk_width {
                    let i = row + x as usize * 4;
                    if let Some(px) = frame.data.get(i..i + 4) {
                        sum += 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                        count += 1;
                    }
                }
            }
            values.push(if count == 0 { 0.0 } else { sum / count as f32 });
        }
    }

    LuminanceGrid {
        grid_width,
        grid_height,
        values,
        captured_at: frame.captured_at,
        predictions: Vec::new(),
    }
}

fn find_motion(previous: &LuminanceGrid, current: &LuminanceGrid, chunk_width: u32, chunk_height: u32) -> Vec<Prediction> {
    let (gw, gh) = (current.grid_width as usize, current.grid_height as usize);

    // --- 1. Active chunks ---
    let active: Vec<bool> = previous
        .values
        .iter()
        .zip(&current.values)
        .map(|(a, b)| (a - b).abs() > LUMINANCE_THRESHOLD)
        .collect();

    // --- 2. Region growing ---
    let mut visited = vec![false; active.len()];
    let mut predictions = Vec::new();
    for start in 0..active.len() {
        if !active[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (gw, gh, 0, 0);
        let mut size = 0usize;

        while let Some(i) = queue.pop_front() {
            let (x, y) = (i % gw, i / gw);
            size += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let neighbours = [
                (x > 0).then(|| i - 1),
                (x + 1 < gw).then(|| i + 1),
                (y > 0).then(|| i - gw),
                (y + 1 < gh).then(|| i + gw),
            ];
            for n in neighbours.into_iter().flatten() {
                if active[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        // --- 3. Reporting ---
        if size < MIN_BLOB_CHUNKS {
            continue;
        }
        let span_x = max_x - min_x + 1;
        let span_y = max_y - min_y + 1;
        let score = size as f32 / (span_x * span_y) as f32;
        predictions.push(Prediction::new(
            MOTION_CLASS,
            score,
            [
                (min_x as u32 * chunk_width) as f32,
                (min_y as u32 * chunk_height) as f32,
                (span_x as u32 * chunk_width) as f32,
                (span_y as u32 * chunk_height) as f32,
            ],
        ));
    }
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_overlay::BoundingBox;

    fn frame_with_block(width: u32, height: u32, block: Option<(u32, u32, u32, u32)>) -> Frame {
        let mut data = vec![0u8; Frame::rgba_len(width, height)];
        if let Some((bx, by, bw, bh)) = block {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let i = ((y * width + x) * 4) as usize;
                    data[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
                }
            }
        }
        Frame::new(width, height, data)
    }

    /// Re-stamps `frame` as captured `ms` after `base`.
    fn at(base: Instant, frame: Frame, ms: u64) -> Frame {
        Frame {
            captured_at: base + Duration::from_millis(ms),
            ..frame
        }
    }

    fn config() -> MotionConfig {
        MotionConfig {
            chunk_width: 8,
            chunk_height: 8,
            load_delay: Duration::ZERO,
            ..MotionConfig::default()
        }
    }

    #[test]
    fn first_frame_reports_nothing_and_still_scene_stays_quiet() {
        let a = luminance_grid(&frame_with_block(64, 64, None), 8, 8);
        assert_eq!(a.values.len(), 64);
        assert!(find_motion(&a, &a, 8, 8).is_empty());
    }

    #[test]
    fn appearing_block_is_boxed_in_pixels() {
        let before = luminance_grid(&frame_with_block(64, 64, None), 8, 8);
        let after = luminance_grid(&frame_with_block(64, 64, Some((16, 8, 16, 24))), 8, 8);
        let found = find_motion(&before, &after, 8, 8);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class, "motion");
        assert_eq!(found[0].bbox, BoundingBox::from([16.0, 8.0, 16.0, 24.0]));
        assert_eq!(found[0].score, 1.0);
    }

    #[test]
    fn single_chunk_flicker_is_ignored() {
        let before = luminance_grid(&frame_with_block(64, 64, None), 8, 8);
        let after = luminance_grid(&frame_with_block(64, 64, Some((0, 0, 8, 8))), 8, 8);
        assert!(find_motion(&before, &after, 8, 8).is_empty());
    }

    #[test]
    fn separate_regions_become_separate_predictions() {
        let before = luminance_grid(&frame_with_block(64, 64, None), 8, 8);
        let mut after_frame = frame_with_block(64, 64, Some((0, 0, 16, 8)));
        let mut data = after_frame.data.to_vec();
        for y in 48..64u32 {
            for x in 48..64u32 {
                let i = ((y * 64 + x) * 4) as usize;
                data[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        after_frame.data = data.into();
        let after = luminance_grid(&after_frame, 8, 8);
        assert_eq!(find_motion(&before, &after, 8, 8).len(), 2);
    }

    #[test]
    fn late_frame_does_not_replace_newer_reference() {
        let base = Instant::now();
        let stamp = |frame: Frame, ms: u64| at(base, frame, ms);
        let previous: SharedGrid = Arc::new(Mutex::new(None));
        let moved = Some((0, 0, 32, 32));

        analyse(&previous, &stamp(frame_with_block(64, 64, None), 0), 8, 8).unwrap();
        analyse(&previous, &stamp(frame_with_block(64, 64, moved), 20), 8, 8).unwrap();
        // The frame captured in between finishes last.
        let late = analyse(&previous, &stamp(frame_with_block(64, 64, None), 10), 8, 8).unwrap();
        assert_eq!(late.len(), 1);

        // The next frame is still compared with the one captured at 20ms.
        let next = analyse(&previous, &stamp(frame_with_block(64, 64, moved), 30), 8, 8).unwrap();
        assert!(next.is_empty());
        let reference = previous.lock().unwrap();
        assert_eq!(reference.as_ref().map(|g| g.captured_at), Some(base + Duration::from_millis(30)));
    }

    #[test]
    fn repeated_frame_gets_its_first_answer() {
        let base = Instant::now();
        let previous: SharedGrid = Arc::new(Mutex::new(None));
        analyse(&previous, &at(base, frame_with_block(64, 64, None), 0), 8, 8).unwrap();
        let moved = at(base, frame_with_block(64, 64, Some((0, 0, 32, 32))), 33);
        let first = analyse(&previous, &moved, 8, 8).unwrap();
        let again = analyse(&previous, &moved, 8, 8).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn detector_compares_against_previous_call() {
        let base = Instant::now();
        let detector = MotionModel::new(config()).load().await.ok().unwrap();
        let first = detector.detect(at(base, frame_with_block(64, 64, None), 0)).await.unwrap();
        assert!(first.is_empty());
        let second = detector
            .detect(at(base, frame_with_block(64, 64, Some((0, 0, 32, 32))), 33))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn configured_failure_rejects_load() {
        let failing = MotionConfig {
            fail_load: true,
            ..config()
        };
        assert!(MotionModel::new(failing).load().await.is_err());
    }

    #[test]
    fn latency_pattern_makes_calls_overtake() {
        let detector = MotionDetector::new(MotionConfig {
            latency: Duration::from_millis(10),
            ..config()
        });
        assert_eq!(detector.latency_for(0), Duration::from_millis(10));
        assert_eq!(detector.latency_for(1), Duration::from_millis(30));
        assert_eq!(detector.latency_for(2), Duration::from_millis(20));
    }
}
