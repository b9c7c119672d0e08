// THEORY:
// The `InitializationCoordinator` owns the single transition from "nothing is
// ready" to "the detection loop is running". Two capabilities initialize
// independently and at their own pace:
//
// 1.  **Camera**: request access (environment-facing by default), then wait for
//     the granted stream to report its first metadata.
// 2.  **Model**: wait for the detector to finish loading.
//
// Both readiness signals are awaited concurrently. The loop is handed its frame
// source and detector only when *both* have resolved, whatever order they
// arrive in. Any failure ends the session and nothing is retried. A camera
// failure is shown to the user exactly once, even when the model has already
// failed; a model failure is only logged.

use crate::clock::RefreshClock;
use crate::detection_loop::{DetectionLoop, LoopOptions};
use crate::detector::ModelLoader;
use crate::error::{CameraError, InitError};
use crate::frame::{CameraAccess, CameraConstraints, FrameSource, StreamMetadata};
use crate::renderer::OverlayRenderer;
use crate::surface::Surface;
use tracing::{error, info};

/// The user-facing alert channel of the hosting view.
pub trait Notifier: Send {
    fn alert(&mut self, message: &str);
}

/// The two independent readiness flags gating the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub camera: bool,
    pub model: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.camera && self.model
    }
}

/// Everything the loop needs, available only once both capabilities are ready.
pub struct Ready<F, D> {
    pub source: F,
    pub detector: D,
    pub metadata: StreamMetadata,
}

pub struct InitializationCoordinator<N: Notifier> {
    constraints: CameraConstraints,
    notifier: N,
    readiness: Readiness,
}

impl<N: Notifier> InitializationCoordinator<N> {
    pub fn new(constraints: CameraConstraints, notifier: N) -> Self {
        Self {
            constraints,
            notifier,
            readiness: Readiness::default(),
        }
    }

    /// Readiness as last observed by `initialize`.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Waits for camera and model readiness, in whichever order they resolve.
    pub async fn initialize<A, L>(&mut self, camera: A, loader: L) -> Result<Ready<A::Source, L::Model>, InitError>
    where
        A: CameraAccess,
        L: ModelLoader,
    {
        self.readiness = Readiness::default();
        let constraints = self.constraints;
        let camera_ready = async move {
            let mut camera = camera;
            let mut source = camera.request(&constraints).await?;
            let metadata = source.metadata_loaded().await?;
            Ok::<_, CameraError>((source, metadata))
        };
        let model_ready = loader.load();
        tokio::pin!(camera_ready, model_ready);

        let mut stream = None;
        let mut detector = None;
        loop {
            tokio::select! {
                result = &mut camera_ready, if !self.readiness.camera => match result {
                    Ok((source, metadata)) => {
                        info!(width = metadata.width, height = metadata.height, facing = ?constraints.facing, "camera ready");
                        self.readiness.camera = true;
                        match detector.take() {
                            Some(detector) => return Ok(Ready { source, detector, metadata }),
                            None => stream = Some((source, metadata)),
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "camera unavailable; overlay will not start");
                        self.notifier.alert(&camera_alert(&err));
                        return Err(err.into());
                    }
                },
                result = &mut model_ready, if !self.readiness.model => match result {
                    Ok(model) => {
                        info!("detection model loaded");
                        self.readiness.model = true;
                        match stream.take() {
                            Some((source, metadata)) => return Ok(Ready { source, detector: model, metadata }),
                            None => detector = Some(model),
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "model failed to load; overlay will not start");
                        // The permission prompt is independent of the model, so
                        // its outcome still reaches the user.
                        if !self.readiness.camera {
                            if let Err(camera_err) = (&mut camera_ready).await {
                                error!(error = %camera_err, "camera unavailable");
                                self.notifier.alert(&camera_alert(&camera_err));
                            }
                        }
                        return Err(err.into());
                    }
                },
            }
        }
    }

    /// Initializes both capabilities and hands them to a new detection loop.
    pub async fn start<A, L, S, C>(
        &mut self,
        camera: A,
        loader: L,
        renderer: OverlayRenderer<S>,
        clock: C,
        options: LoopOptions,
    ) -> Result<DetectionLoop<A::Source, L::Model, S, C>, InitError>
    where
        A: CameraAccess,
        L: ModelLoader,
        S: Surface,
        C: RefreshClock,
    {
        let ready = self.initialize(camera, loader).await?;
        info!("camera and model ready; starting detection loop");
        Ok(DetectionLoop::new(ready.source, ready.detector, renderer, clock, options))
    }
}

fn camera_alert(err: &CameraError) -> String {
    match err {
        CameraError::PermissionDenied => {
            "Camera access was denied. Allow camera access and reload to see detections.".to_string()
        }
        CameraError::NotFound(_) => "No camera was found. Connect a camera and reload.".to_string(),
        CameraError::Stream(detail) => format!("The camera stream could not be started: {detail}"),
    }
}
