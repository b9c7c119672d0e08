// THEORY:
// Ticks are paced by the display, not by a free-running timer. The loop only
// needs "wake me at the next refresh", so the refresh source is a small trait
// with two implementations:
//
// 1.  `IntervalClock` approximates vsync with a tokio interval at the configured
//     refresh rate. Late refreshes are skipped rather than bunched up, the same
//     way a compositor drops frames instead of replaying them.
// 2.  `ManualClock` is fed by whoever owns the real refresh signal (or by a test)
//     through a channel. Dropping its `RefreshTrigger` ends the stream of ticks.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// A display-refresh-aligned callback source.
#[async_trait]
pub trait RefreshClock: Send {
    /// Waits for the next refresh. `None` means no more refreshes will come.
    async fn next_refresh(&mut self) -> Option<Instant>;
}

/// Refreshes at a fixed rate using a tokio interval.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(refresh_hz: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl RefreshClock for IntervalClock {
    async fn next_refresh(&mut self) -> Option<Instant> {
        Some(self.interval.tick().await.into_std())
    }
}

/// Sending half of a `ManualClock`.
#[derive(Clone)]
pub struct RefreshTrigger {
    tx: mpsc::UnboundedSender<Instant>,
}

impl RefreshTrigger {
    /// Signals one refresh. Returns `false` once the clock has been dropped.
    pub fn refresh(&self) -> bool {
        self.tx.send(Instant::now()).is_ok()
    }
}

/// Refreshes whenever its `RefreshTrigger` fires.
pub struct ManualClock {
    rx: mpsc::UnboundedReceiver<Instant>,
}

impl ManualClock {
    pub fn new() -> (RefreshTrigger, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RefreshTrigger { tx }, Self { rx })
    }
}

#[async_trait]
impl RefreshClock for ManualClock {
    async fn next_refresh(&mut self) -> Option<Instant> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_ends_when_trigger_drops() {
        let (trigger, mut clock) = ManualClock::new();
        assert!(trigger.refresh());
        assert!(clock.next_refresh().await.is_some());
        drop(trigger);
        assert!(clock.next_refresh().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_clock_keeps_ticking() {
        let mut clock = IntervalClock::new(60.0);
        let first = clock.next_refresh().await.unwrap();
        let second = clock.next_refresh().await.unwrap();
        assert!(second > first);
    }
}
