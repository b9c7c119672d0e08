// THEORY:
// The `DetectionLoop` is the heartbeat of the overlay. Once the camera and the
// model are both ready it runs one tick per display refresh until the hosting
// view tears it down.
//
// Tick algorithm:
// 1.  **Check for teardown** before anything else. A stopped loop issues no
//     further requests and drops whatever is still in flight.
// 2.  **Apply resize notifications** so the next render targets the new size.
// 3.  **Fire and forget**: sample the current frame, stamp it with the next
//     sequence number and start `detect`. The tick does not wait for the result,
//     so the next refresh is always serviced on time and several calls can be in
//     flight together.
// 4.  **Completion**: when a call resolves, its predictions go to the renderer,
//     subject to the ordering policy. A failed call is logged and skipped.
//
// Concurrency model: ticks and completions are multiplexed on a single task with
// `tokio::select!`, and in-flight calls live in a `FuturesUnordered` owned by
// that task. The surface therefore has exactly one user and needs no locking.
//
// Ordering: with `OrderingPolicy::Sequenced` a result is applied only if no
// later-numbered result has been applied already, so the picture never moves
// backwards in time. `OrderingPolicy::CompletionOrder` renders every result the
// moment it arrives, even when an older, slower call lands after a newer one.

use crate::clock::RefreshClock;
use crate::detector::{DetectOutcome, Detector};
use crate::frame::FrameSource;
use crate::renderer::OverlayRenderer;
use crate::surface::{Surface, SurfaceSize};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Monotonic id given to each detect request at issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How completions that arrive out of request order are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Discard results older than the newest one already rendered.
    #[default]
    Sequenced,
    /// Render every result as it completes, whatever its age.
    CompletionOrder,
}

/// Decides whether a completed request may be rendered.
#[derive(Debug, Clone)]
pub struct SequenceGate {
    policy: OrderingPolicy,
    latest_applied: Option<SequenceNumber>,
}

impl SequenceGate {
    pub fn new(policy: OrderingPolicy) -> Self {
        Self {
            policy,
            latest_applied: None,
        }
    }

    /// Returns `true` if the result of `seq` should be rendered, and records it
    /// as applied.
    pub fn admit(&mut self, seq: SequenceNumber) -> bool {
        let newer = self.latest_applied.is_none_or(|latest| seq > latest);
        match self.policy {
            OrderingPolicy::Sequenced if !newer => false,
            _ => {
                if newer {
                    self.latest_applied = Some(seq);
                }
                true
            }
        }
    }

    pub fn latest_applied(&self) -> Option<SequenceNumber> {
        self.latest_applied
    }
}

/// Lifecycle of a loop. A loop is built in `Running`; there is no way back
/// from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Running counters, published after every tick and every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Refresh callbacks serviced.
    pub ticks: u64,
    /// Detect calls started.
    pub requests_issued: u64,
    /// Ticks where the source had no frame to offer.
    pub frames_missing: u64,
    /// Ticks skipped because `max_in_flight` calls were already pending.
    pub throttled: u64,
    /// Results handed to the renderer.
    pub rendered: u64,
    /// Successful results discarded because a newer one was already on screen.
    pub stale_discarded: u64,
    /// Detect calls that rejected.
    pub failed: u64,
}

impl LoopStats {
    /// Calls that have been issued but have not resolved yet.
    pub fn in_flight(&self) -> u64 {
        self.requests_issued - self.rendered - self.stale_discarded - self.failed
    }
}

/// Tunables for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopOptions {
    pub ordering: OrderingPolicy,
    /// Upper bound on concurrent detect calls. `None` leaves them unbounded.
    pub max_in_flight: Option<usize>,
}

/// Cloneable control handle given to the hosting view.
#[derive(Clone)]
pub struct LoopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    size_tx: Arc<watch::Sender<SurfaceSize>>,
    state_rx: watch::Receiver<LoopState>,
    stats_rx: watch::Receiver<LoopStats>,
}

impl LoopHandle {
    /// Asks the loop to halt. Takes effect no later than the next tick.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Notifies the loop that the drawing surface changed size.
    pub fn resize(&self, size: SurfaceSize) {
        self.size_tx.send_replace(size);
    }

    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    pub fn stats(&self) -> LoopStats {
        *self.stats_rx.borrow()
    }

    /// Waits until the published stats satisfy `predicate`.
    ///
    /// Returns the latest stats if the loop goes away first.
    pub async fn wait_for_stats(&mut self, mut predicate: impl FnMut(&LoopStats) -> bool) -> LoopStats {
        let reached = self.stats_rx.wait_for(|stats| predicate(stats)).await.map(|stats| *stats);
        reached.unwrap_or_else(|_| *self.stats_rx.borrow())
    }

    /// Waits until the loop has reached `Stopped`.
    pub async fn stopped(&mut self) {
        let _ = self.state_rx.wait_for(|state| *state == LoopState::Stopped).await;
    }
}

type InFlight = FuturesUnordered<BoxFuture<'static, (SequenceNumber, DetectOutcome)>>;

/// The display-refresh-aligned detect/render scheduler.
pub struct DetectionLoop<F, D, S, C>
where
    F: FrameSource,
    D: Detector,
    S: Surface,
    C: RefreshClock,
{
    source: F,
    detector: D,
    renderer: OverlayRenderer<S>,
    clock: C,
    options: LoopOptions,
    gate: SequenceGate,
    next_seq: u64,
    stats: LoopStats,
    stop_rx: watch::Receiver<bool>,
    size_rx: watch::Receiver<SurfaceSize>,
    state_tx: watch::Sender<LoopState>,
    stats_tx: watch::Sender<LoopStats>,
    /// Keeps the control channels open even if every external handle is dropped.
    handle: LoopHandle,
}

impl<F, D, S, C> DetectionLoop<F, D, S, C>
where
    F: FrameSource,
    D: Detector,
    S: Surface,
    C: RefreshClock,
{
    pub fn new(source: F, detector: D, renderer: OverlayRenderer<S>, clock: C, options: LoopOptions) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (size_tx, size_rx) = watch::channel(renderer.surface().size());
        let (state_tx, state_rx) = watch::channel(LoopState::Running);
        let (stats_tx, stats_rx) = watch::channel(LoopStats::default());
        let handle = LoopHandle {
            stop_tx: Arc::new(stop_tx),
            size_tx: Arc::new(size_tx),
            state_rx,
            stats_rx,
        };
        Self {
            source,
            detector,
            renderer,
            clock,
            gate: SequenceGate::new(options.ordering),
            options,
            next_seq: 0,
            stats: LoopStats::default(),
            stop_rx,
            size_rx,
            state_tx,
            stats_tx,
            handle,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LoopState {
        *self.state_tx.borrow()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn renderer(&self) -> &OverlayRenderer<S> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut OverlayRenderer<S> {
        &mut self.renderer
    }

    pub fn source_mut(&mut self) -> &mut F {
        &mut self.source
    }

    /// Runs ticks until the loop is stopped or its clock ends.
    ///
    /// In-flight detect calls are dropped on exit. Calling `run` again on a
    /// stopped loop returns immediately.
    pub async fn run(&mut self) -> LoopStats {
        if self.state() == LoopState::Stopped {
            return self.stats;
        }
        info!(ordering = ?self.options.ordering, max_in_flight = ?self.options.max_in_flight, "detection loop running");

        let mut in_flight: InFlight = FuturesUnordered::new();
        loop {
            tokio::select! {
                biased;

                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        debug!("stop requested");
                        break;
                    }
                }

                Some((seq, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.complete(seq, outcome);
                }

                refresh = self.clock.next_refresh() => {
                    if refresh.is_none() {
                        debug!("refresh clock closed");
                        break;
                    }
                    if *self.stop_rx.borrow() {
                        break;
                    }
                    self.tick(&mut in_flight);
                }
            }
        }

        let dropped = in_flight.len();
        drop(in_flight);
        self.handle.stop_tx.send_replace(true);
        self.state_tx.send_replace(LoopState::Stopped);
        info!(
            ticks = self.stats.ticks,
            rendered = self.stats.rendered,
            stale = self.stats.stale_discarded,
            failed = self.stats.failed,
            dropped_in_flight = dropped,
            "detection loop stopped"
        );
        self.stats
    }

    fn tick(&mut self, in_flight: &mut InFlight) {
        self.stats.ticks += 1;

        // --- 1. Resize notifications ---
        if self.size_rx.has_changed().unwrap_or(false) {
            let size = *self.size_rx.borrow_and_update();
            debug!(width = size.width, height = size.height, "resizing overlay surface");
            self.renderer.resize(size);
        }

        // --- 2. Back-pressure (only when configured) ---
        if let Some(limit) = self.options.max_in_flight {
            if in_flight.len() >= limit {
                self.stats.throttled += 1;
                trace!(in_flight = in_flight.len(), "in-flight limit reached; skipping tick");
                self.publish();
                return;
            }
        }

        // --- 3. Issue detection without waiting for it ---
        let Some(frame) = self.source.current_frame() else {
            self.stats.frames_missing += 1;
            trace!("no frame available this tick");
            self.publish();
            return;
        };
        let seq = SequenceNumber(self.next_seq);
        self.next_seq += 1;
        let request = self.detector.detect(frame);
        in_flight.push(request.map(move |outcome| (seq, outcome)).boxed());
        self.stats.requests_issued += 1;
        trace!(%seq, in_flight = in_flight.len(), "detect issued");
        self.publish();
    }

    fn complete(&mut self, seq: SequenceNumber, outcome: DetectOutcome) {
        match outcome {
            Ok(predictions) => {
                if self.gate.admit(seq) {
                    self.renderer.render(&predictions);
                    self.stats.rendered += 1;
                    trace!(%seq, count = predictions.len(), "rendered predictions");
                } else {
                    self.stats.stale_discarded += 1;
                    debug!(%seq, latest = ?self.gate.latest_applied(), "discarding stale result");
                }
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!(%seq, error = %err, "detection failed; skipping render");
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequenced_gate_rejects_older_results() {
        let mut gate = SequenceGate::new(OrderingPolicy::Sequenced);
        assert!(gate.admit(SequenceNumber(1)));
        assert!(!gate.admit(SequenceNumber(0)));
        assert!(!gate.admit(SequenceNumber(1)));
        assert!(gate.admit(SequenceNumber(3)));
        assert!(!gate.admit(SequenceNumber(2)));
        assert_eq!(gate.latest_applied(), Some(SequenceNumber(3)));
    }

    #[test]
    fn completion_order_gate_admits_everything() {
        let mut gate = SequenceGate::new(OrderingPolicy::CompletionOrder);
        assert!(gate.admit(SequenceNumber(5)));
        assert!(gate.admit(SequenceNumber(2)));
        assert_eq!(gate.latest_applied(), Some(SequenceNumber(5)));
    }

    #[test]
    fn in_flight_is_derived_from_counters() {
        let stats = LoopStats {
            requests_issued: 10,
            rendered: 4,
            stale_discarded: 2,
            failed: 1,
            ..LoopStats::default()
        };
        assert_eq!(stats.in_flight(), 3);
    }
}
