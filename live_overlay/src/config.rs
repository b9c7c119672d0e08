use crate::detection_loop::{LoopOptions, OrderingPolicy};
use crate::error::ConfigError;
use crate::frame::{CameraConstraints, FacingMode};
use crate::renderer::OverlayStyle;
use crate::surface::{Color, Font, SurfaceSize};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SURFACE_WIDTH: u32 = 640;
const DEFAULT_SURFACE_HEIGHT: u32 = 480;
const DEFAULT_REFRESH_HZ: f64 = 60.0;
const DEFAULT_LINE_WIDTH: f32 = 4.0;
const DEFAULT_FONT_SIZE: f32 = 16.0;
const DEFAULT_LABEL_PADDING: f32 = 4.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    surface: Option<SurfaceConfigFile>,
    #[serde(rename = "loop")]
    scheduler: Option<SchedulerConfigFile>,
    camera: Option<CameraConfigFile>,
    style: Option<StyleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SurfaceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SchedulerConfigFile {
    refresh_hz: Option<f64>,
    ordering: Option<OrderingPolicy>,
    max_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    facing: Option<FacingMode>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StyleConfigFile {
    stroke_color: Option<Color>,
    line_width: Option<f32>,
    label_background: Option<Color>,
    text_color: Option<Color>,
    font_size: Option<f32>,
    label_padding: Option<f32>,
}

/// Fully resolved engine configuration. Every field has a default, so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Size of the overlay surface. Only ever changed by explicit resizes.
    pub surface: SurfaceSize,
    pub refresh_hz: f64,
    pub ordering: OrderingPolicy,
    pub max_in_flight: Option<usize>,
    pub facing: FacingMode,
    pub style: OverlayStyle,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::from_file(OverlayConfigFile::default())
    }
}

impl OverlayConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: OverlayConfigFile = toml::from_str(raw)?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayConfigFile) -> Self {
        let surface = file.surface.unwrap_or_default();
        let scheduler = file.scheduler.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let style = file.style.unwrap_or_default();
        let defaults = OverlayStyle::default();

        Self {
            surface: SurfaceSize::new(
                surface.width.unwrap_or(DEFAULT_SURFACE_WIDTH),
                surface.height.unwrap_or(DEFAULT_SURFACE_HEIGHT),
            ),
            refresh_hz: scheduler.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
            ordering: scheduler.ordering.unwrap_or_default(),
            max_in_flight: scheduler.max_in_flight,
            facing: camera.facing.unwrap_or_default(),
            style: OverlayStyle {
                stroke_color: style.stroke_color.unwrap_or(defaults.stroke_color),
                line_width: style.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
                label_background: style.label_background.unwrap_or(defaults.label_background),
                text_color: style.text_color.unwrap_or(defaults.text_color),
                font: Font {
                    size_px: style.font_size.unwrap_or(DEFAULT_FONT_SIZE),
                },
                label_padding: style.label_padding.unwrap_or(DEFAULT_LABEL_PADDING),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::Invalid("surface width and height must be non-zero".into()));
        }
        if !(self.refresh_hz.is_finite() && self.refresh_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "refresh_hz must be a positive number, got {}",
                self.refresh_hz
            )));
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1 when set".into()));
        }
        if !(self.style.font.size_px > 0.0) {
            return Err(ConfigError::Invalid("style.font_size must be positive".into()));
        }
        if !(self.style.line_width >= 0.0) || !(self.style.label_padding >= 0.0) {
            return Err(ConfigError::Invalid(
                "style.line_width and style.label_padding must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            ordering: self.ordering,
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn camera_constraints(&self) -> CameraConstraints {
        CameraConstraints { facing: self.facing }
    }
}
