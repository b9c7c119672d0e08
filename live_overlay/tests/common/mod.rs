#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use live_overlay::{
    CameraAccess, CameraConstraints, CameraError, DetectError, DetectOutcome, Detector, Frame, FrameSource,
    ModelLoadError, ModelLoader, Notifier, StreamMetadata,
};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// A source that always offers the same frame (or none at all).
pub struct StaticSource {
    frame: Option<Frame>,
    metadata_gate: Option<oneshot::Receiver<Result<(), CameraError>>>,
}

impl StaticSource {
    pub fn with_frame() -> Self {
        Self {
            frame: Some(Frame::blank(WIDTH, HEIGHT)),
            metadata_gate: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            frame: None,
            metadata_gate: None,
        }
    }

    /// Metadata resolves only when the returned sender fires.
    pub fn gated() -> (oneshot::Sender<Result<(), CameraError>>, Self) {
        let (tx, rx) = oneshot::channel();
        let mut source = Self::with_frame();
        source.metadata_gate = Some(rx);
        (tx, source)
    }
}

#[async_trait]
impl FrameSource for StaticSource {
    async fn metadata_loaded(&mut self) -> Result<StreamMetadata, CameraError> {
        if let Some(gate) = self.metadata_gate.take() {
            gate.await
                .map_err(|_| CameraError::Stream("metadata gate dropped".into()))??;
        }
        Ok(StreamMetadata {
            width: WIDTH,
            height: HEIGHT,
        })
    }

    fn current_frame(&mut self) -> Option<Frame> {
        self.frame.clone()
    }
}

/// A camera whose permission prompt resolves when the test says so.
pub struct TestCamera {
    grant: oneshot::Receiver<Result<StaticSource, CameraError>>,
    pub seen: Arc<Mutex<Vec<CameraConstraints>>>,
}

impl TestCamera {
    pub fn new() -> (oneshot::Sender<Result<StaticSource, CameraError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                grant: rx,
                seen: Arc::new(Mutex::new(Vec::new())),
            },
        )
    }
}

#[async_trait]
impl CameraAccess for TestCamera {
    type Source = StaticSource;

    async fn request(&mut self, constraints: &CameraConstraints) -> Result<StaticSource, CameraError> {
        self.seen.lock().unwrap().push(*constraints);
        (&mut self.grant)
            .await
            .map_err(|_| CameraError::NotFound("grant dropped".into()))?
    }
}

/// A detect call waiting for the test to decide its outcome.
pub struct PendingCall {
    pub frame: Frame,
    reply: oneshot::Sender<DetectOutcome>,
}

impl PendingCall {
    /// Resolves the call. Returns `false` if the loop has already dropped it.
    pub fn resolve(self, outcome: DetectOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// A detector whose calls are resolved by hand, in any order.
#[derive(Clone)]
pub struct ScriptedDetector {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ScriptedDetector {
    pub fn new() -> (mpsc::UnboundedReceiver<PendingCall>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (rx, Self { calls: tx })
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, DetectOutcome> {
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall { frame, reply });
        async move {
            rx.await
                .unwrap_or_else(|_| Err(DetectError("call abandoned".into())))
        }
        .boxed()
    }
}

/// A model that finishes loading when the test says so.
pub struct TestLoader {
    done: oneshot::Receiver<Result<ScriptedDetector, ModelLoadError>>,
}

impl TestLoader {
    pub fn new() -> (oneshot::Sender<Result<ScriptedDetector, ModelLoadError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { done: rx })
    }
}

#[async_trait]
impl ModelLoader for TestLoader {
    type Model = ScriptedDetector;

    async fn load(self) -> Result<ScriptedDetector, ModelLoadError> {
        self.done
            .await
            .map_err(|_| ModelLoadError("loader dropped".into()))?
    }
}

/// Collects every alert shown to the user.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub alerts: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&mut self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}
