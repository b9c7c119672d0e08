// THEORY:
// `overlay_tester` is the hands-on harness for the overlay engine. It wires the
// library's capability traits to concrete implementations and lets a developer
// watch the whole thing run:
//
// 1.  **Headless** (default): a synthetic camera feeds a motion detector, the
//     overlay is rendered into an `ImageSurface`, and after `--frames` renders
//     the overlay is composited over the latest frame and written as a PNG.
// 2.  **Live** (`--camera <index>`, `opencv` feature): a real capture device,
//     an OpenCV-backed surface and a preview window. `q` or Esc stops the loop.
//
// `--deny-camera` and `--fail-model` force the two initialization failure paths.

#[cfg(feature = "opencv")]
mod capture;
mod motion_detector;
mod synthetic;
mod threaded;

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use live_overlay::{
    FrameSource, ImageSurface, InitializationCoordinator, IntervalClock, Notifier, OverlayConfig, OverlayRenderer,
};
use motion_detector::{MotionConfig, MotionModel};
use std::path::PathBuf;
use std::time::Duration;
use synthetic::SyntheticCamera;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "live_overlay=info,overlay_tester=info";

#[derive(Parser, Debug)]
#[command(name = "overlay_tester", about = "Runs the live detection overlay against a camera and a demo model")]
struct Args {
    /// TOML configuration file. Built-in defaults are used when absent.
    #[arg(long, env = "OVERLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Number of rendered overlays after which the headless run stops.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Where the headless run writes the composited overlay.
    #[arg(long, default_value = "overlay.png")]
    output: PathBuf,

    /// Capture device index. Requires the `opencv` feature.
    #[arg(long)]
    camera: Option<i32>,

    /// Base artificial detection latency; calls vary between 1x and 3x of it.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Make the synthetic camera refuse access.
    #[arg(long)]
    deny_camera: bool,

    /// Make the model fail to load.
    #[arg(long)]
    fail_model: bool,
}

/// Shows alerts on the terminal, the tester's only "view".
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn alert(&mut self, message: &str) {
        eprintln!("[alert] {message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 2. Arguments & Configuration ---
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => OverlayConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => OverlayConfig::default(),
    };
    info!(
        width = config.surface.width,
        height = config.surface.height,
        refresh_hz = config.refresh_hz,
        ordering = ?config.ordering,
        "configuration loaded"
    );

    let motion = MotionConfig {
        latency: Duration::from_millis(args.latency_ms),
        fail_load: args.fail_model,
        ..MotionConfig::default()
    };

    // --- 3. Mode Selection ---
    match args.camera {
        #[cfg(feature = "opencv")]
        Some(index) => capture::run(index, &config, motion).await,
        #[cfg(not(feature = "opencv"))]
        Some(_) => anyhow::bail!("--camera needs overlay_tester built with the `opencv` feature"),
        None => run_headless(&args, &config, motion).await,
    }
}

async fn run_headless(args: &Args, config: &OverlayConfig, motion: MotionConfig) -> Result<()> {
    // --- 1. Initialization ---
    let mut coordinator = InitializationCoordinator::new(config.camera_constraints(), ConsoleNotifier);
    let renderer = OverlayRenderer::new(ImageSurface::new(config.surface), config.style.clone());
    let mut lp = coordinator
        .start(
            SyntheticCamera::new(config.surface, args.deny_camera),
            MotionModel::new(motion),
            renderer,
            IntervalClock::new(config.refresh_hz),
            config.loop_options(),
        )
        .await
        .context("overlay did not start")?;

    // --- 2. Run Until Enough Renders (or Ctrl-C) ---
    let mut handle = lp.handle();
    let frames = args.frames;
    let driver = async move {
        tokio::select! {
            stats = handle.wait_for_stats(|stats| stats.rendered >= frames) => {
                info!(rendered = stats.rendered, "render target reached");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "could not listen for ctrl-c");
                }
                info!("interrupted");
            }
        }
        handle.stop();
    };
    let (stats, ()) = tokio::join!(lp.run(), driver);
    info!(
        ticks = stats.ticks,
        issued = stats.requests_issued,
        rendered = stats.rendered,
        stale = stats.stale_discarded,
        failed = stats.failed,
        missing = stats.frames_missing,
        "detection loop stopped"
    );

    // --- 3. Composite & Save ---
    // The overlay was drawn for a frame a few steps older than this one; for a
    // slow-moving square that offset is a handful of pixels.
    let frame = lp.source_mut().current_frame().context("camera produced no final frame")?;
    let background = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        .context("frame buffer does not match its dimensions")?;
    let composited = lp.renderer().surface().composite_onto(&background);
    composited
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("Overlay saved to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_spells_out_the_defaults() {
        let cfg = OverlayConfig::from_toml_str(include_str!("../overlay.example.toml")).unwrap();
        assert_eq!(cfg, OverlayConfig::default());
    }

    #[test]
    fn cli_defaults_and_flags() {
        let args = Args::try_parse_from(["overlay_tester"]).unwrap();
        assert_eq!(args.frames, 120);
        assert_eq!(args.output, PathBuf::from("overlay.png"));
        assert!(args.camera.is_none());
        assert!(!args.deny_camera);

        let args = Args::try_parse_from([
            "overlay_tester",
            "--frames",
            "10",
            "--latency-ms",
            "40",
            "--camera",
            "1",
            "--fail-model",
        ])
        .unwrap();
        assert_eq!(args.frames, 10);
        assert_eq!(args.latency_ms, 40);
        assert_eq!(args.camera, Some(1));
        assert!(args.fail_model);
    }
}
