// THEORY:
// The detection model is an opaque, asynchronously loaded capability. The engine
// only needs two things from it: a way to wait for it to load, and a `detect`
// call that may be issued again before the previous one has finished.
//
// `detect` returns a `'static` boxed future so the loop can hold many of them in
// flight at once without borrowing the detector. Implementations clone whatever
// shared state they need into the future.

use crate::error::{DetectError, ModelLoadError};
use crate::frame::Frame;
use crate::prediction::Prediction;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// The outcome of one detect call.
pub type DetectOutcome = Result<Vec<Prediction>, DetectError>;

/// A loaded object-detection model.
pub trait Detector: Send + Sync + 'static {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, DetectOutcome>;
}

impl<D: Detector + ?Sized> Detector for Arc<D> {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, DetectOutcome> {
        (**self).detect(frame)
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, DetectOutcome> {
        (**self).detect(frame)
    }
}

/// Produces a `Detector` once the model has finished loading.
#[async_trait]
pub trait ModelLoader: Send {
    type Model: Detector;

    async fn load(self) -> Result<Self::Model, ModelLoadError>;
}

