// THEORY:
// Capture devices deliver frames through blocking reads, while the detection
// loop's task must stay free to service refreshes, completions and stop
// requests. `ThreadedSource` splits the two:
//
// 1.  **Reader thread**: a dedicated OS thread opens the device and then reads
//     it in a loop, publishing every frame into a `watch` slot. The device never
//     leaves that thread.
// 2.  **Slot**: holds only the newest frame. Older ones are overwritten unseen.
// 3.  **Source side**: `current_frame` reads the slot and returns immediately.
//     A slow device repeats frames; it never delays a tick.
//
// The thread ends when the stream ends, a read fails, or the source is dropped
// (the next publish finds no receiver).

use async_trait::async_trait;
use live_overlay::{CameraError, Frame, FrameSource, StreamMetadata};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// A device read that blocks until the next frame is available.
pub trait BlockingReader {
    /// `Ok(None)` means the stream has ended.
    fn read(&mut self) -> Result<Option<Frame>, CameraError>;
}

pub struct ThreadedSource {
    frames: watch::Receiver<Option<Frame>>,
}

impl ThreadedSource {
    /// Opens a device on a new thread named `name` and starts reading it.
    ///
    /// Resolves once `open` has finished, with its error if it failed.
    pub async fn open<R, O>(name: &str, open: O) -> Result<Self, CameraError>
    where
        R: BlockingReader,
        O: FnOnce() -> Result<R, CameraError> + Send + 'static,
    {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (frames_tx, frames_rx) = watch::channel(None);

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut reader = match open() {
                    Ok(reader) => reader,
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return;
                    }
                };
                if opened_tx.send(Ok(())).is_err() {
                    return;
                }
                pump(&mut reader, &frames_tx);
            })
            .map_err(|err| CameraError::Stream(format!("could not start capture thread: {err}")))?;

        opened_rx
            .await
            .map_err(|_| CameraError::Stream("capture thread exited while opening the device".into()))??;
        Ok(Self { frames: frames_rx })
    }
}

fn pump<R: BlockingReader>(reader: &mut R, frames: &watch::Sender<Option<Frame>>) {
    loop {
        match reader.read() {
            Ok(Some(frame)) => {
                if frames.send(Some(frame)).is_err() {
                    debug!("frame source dropped; capture thread exiting");
                    return;
                }
            }
            Ok(None) => {
                info!("capture stream ended");
                return;
            }
            Err(err) => {
                warn!(error = %err, "capture read failed; stream closed");
                return;
            }
        }
    }
}

#[async_trait]
impl FrameSource for ThreadedSource {
    async fn metadata_loaded(&mut self) -> Result<StreamMetadata, CameraError> {
        let first = self
            .frames
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CameraError::Stream("stream ended before its first frame".into()))?;
        match first.as_ref() {
            Some(frame) => Ok(StreamMetadata {
                width: frame.width,
                height: frame.height,
            }),
            None => Err(CameraError::Stream("stream ended before its first frame".into())),
        }
    }

    fn current_frame(&mut self) -> Option<Frame> {
        // A closed slot means the reader thread is gone.
        if self.frames.has_changed().is_err() {
            return None;
        }
        self.frames.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Blocks on a channel the way a device blocks on the sensor.
    struct ChannelReader(mpsc::Receiver<Frame>);

    impl BlockingReader for ChannelReader {
        fn read(&mut self) -> Result<Option<Frame>, CameraError> {
            Ok(self.0.recv().ok())
        }
    }

    async fn open_channel() -> (mpsc::Sender<Frame>, ThreadedSource) {
        let (tx, rx) = mpsc::channel();
        let source = ThreadedSource::open("test-capture", move || Ok(ChannelReader(rx)))
            .await
            .ok()
            .unwrap();
        (tx, source)
    }

    async fn wait_for_width(source: &mut ThreadedSource, width: u32) -> bool {
        for _ in 0..400 {
            if source.current_frame().is_some_and(|frame| frame.width == width) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn first_frame_provides_the_metadata() {
        let (tx, mut source) = open_channel().await;
        tx.send(Frame::blank(4, 2)).unwrap();
        let metadata = source.metadata_loaded().await.unwrap();
        assert_eq!(metadata, StreamMetadata { width: 4, height: 2 });
    }

    #[tokio::test]
    async fn current_frame_returns_while_the_device_is_blocked() {
        let (tx, mut source) = open_channel().await;
        tx.send(Frame::blank(4, 2)).unwrap();
        source.metadata_loaded().await.unwrap();

        // The reader thread is now parked in `recv`; reads still answer at once.
        assert_eq!(source.current_frame().map(|f| f.width), Some(4));
        assert_eq!(source.current_frame().map(|f| f.width), Some(4));

        tx.send(Frame::blank(6, 2)).unwrap();
        assert!(wait_for_width(&mut source, 6).await);
    }

    #[tokio::test]
    async fn open_failure_is_reported_as_is() {
        let result = ThreadedSource::open("test-capture", || Err::<ChannelReader, _>(CameraError::PermissionDenied)).await;
        assert_eq!(result.err(), Some(CameraError::PermissionDenied));
    }

    #[tokio::test]
    async fn ended_stream_has_no_metadata_and_no_frames() {
        let (tx, mut source) = open_channel().await;
        drop(tx);
        assert!(matches!(source.metadata_loaded().await, Err(CameraError::Stream(_))));
        assert!(source.current_frame().is_none());
    }
}
