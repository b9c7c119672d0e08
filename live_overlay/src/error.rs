// THEORY:
// Every failure in the overlay engine belongs to one of a handful of families,
// and each family has a fixed consequence for the session:
//
// 1.  **Camera failures** (`CameraError`) are fatal. The user is told once, the
//     loop never starts, and nothing retries.
// 2.  **Model load failures** (`ModelLoadError`) are fatal too, but they are only
//     logged; the user sees no alert.
// 3.  **Detection failures** (`DetectError`) are scoped to a single tick. The
//     tick renders nothing and the scheduler keeps going.
// 4.  **Configuration failures** (`ConfigError`) happen before any of the above
//     and are reported to whoever is assembling the engine.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons the camera could not be turned into a usable frame source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// The user (or platform policy) refused camera access.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No camera matching the requested constraints exists.
    #[error("no camera available: {0}")]
    NotFound(String),
    /// The stream was granted but never produced usable metadata.
    #[error("camera stream failed: {0}")]
    Stream(String),
}

/// The detector could not be loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("model failed to load: {0}")]
pub struct ModelLoadError(pub String);

/// A single `detect()` call rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("detection failed: {0}")]
pub struct DetectError(pub String);

/// Terminal outcome of session initialization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
