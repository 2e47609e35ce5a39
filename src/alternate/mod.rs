//! Two workers handing a counter back and forth.
//!
//! The main side seeds the first value and then acts as the second worker.
//! Each worker receives a value, reports it, and passes `value + 1` back to
//! its partner, so output strictly alternates between the two ids. A run ends
//! when the configured number of rounds is used up, the counter would
//! overflow, or the [`StopSignal`] fires; the worker that notices tells its
//! partner and both return.

pub mod task;
pub mod thread;

use std::fmt::Display;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub use task::run_tasks;
pub use thread::run_threads;

/// One reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub worker: u32,
    pub value: u64,
}

impl Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker {}: {}", self.worker, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateConfig {
    pub seed: u64,
    /// Number of values to report; `None` runs until stopped.
    pub rounds: Option<u64>,
    /// Ids of the spawned worker and of the main side, in that order.
    pub workers: [u32; 2],
}

impl Default for AlternateConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: Some(10),
            workers: [1, 2],
        }
    }
}

impl AlternateConfig {
    /// True when `value` is still inside the configured rounds.
    pub(crate) fn admits(&self, value: u64) -> bool {
        match self.rounds {
            Some(rounds) => value - self.seed < rounds,
            None => true,
        }
    }
}

#[derive(Debug)]
pub enum AlternateError {
    Disconnected { worker: u32 },
    WorkerPanicked { worker: u32 },
}

impl Display for AlternateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlternateError::Disconnected { worker } => {
                write!(f, "worker {} lost its partner", worker)
            }
            AlternateError::WorkerPanicked { worker } => {
                write!(f, "worker {} panicked", worker)
            }
        }
    }
}

impl std::error::Error for AlternateError {}

struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cancels a run from outside. Cloning shares the same signal.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn trigger(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn triggered(&self) {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Merges the per-worker transcripts into reporting order.
pub(crate) fn merge_transcripts(mut first: Vec<Tick>, second: Vec<Tick>) -> Vec<Tick> {
    first.extend(second);
    first.sort_by_key(|tick| tick.value);
    first
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_formats_like_a_worker_line() {
        let tick = Tick {
            worker: 2,
            value: 7,
        };
        assert_eq!(tick.to_string(), "worker 2: 7");
    }

    #[test]
    fn admits_only_configured_rounds() {
        let config = AlternateConfig {
            seed: 5,
            rounds: Some(3),
            workers: [1, 2],
        };
        assert!(config.admits(5));
        assert!(config.admits(7));
        assert!(!config.admits(8));

        let forever = AlternateConfig {
            rounds: None,
            ..AlternateConfig::default()
        };
        assert!(forever.admits(u64::MAX));
    }

    #[tokio::test]
    async fn stop_signal_wakes_waiters() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.triggered().await })
        };

        tokio::task::yield_now().await;
        stop.trigger();

        waiter.await.unwrap();
        assert!(stop.is_triggered());

        // Already triggered signals resolve immediately.
        stop.triggered().await;
    }
}
