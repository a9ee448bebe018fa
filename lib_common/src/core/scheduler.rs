//! # Scheduler
//!
//! The ingestors never call `tokio::time` directly. Waiting and reading the
//! clock go through `Scheduler`, so tests can substitute a virtual clock and
//! inspect every requested delay without waiting for it.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Source of delays and time for self-scheduling tasks.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Suspends the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
    /// The current instant on this scheduler's clock.
    fn now(&self) -> Instant;
}

/// Wall-clock scheduler backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// # Virtual Scheduler
///
/// A clock that only moves when someone sleeps on it. `sleep` records the
/// requested delay, advances the clock by it and yields once so other tasks
/// get a turn, then returns immediately.
pub struct VirtualScheduler {
    origin: Instant,
    state: Mutex<VirtualState>,
}

#[derive(Default)]
struct VirtualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl VirtualScheduler {
    /// Creates a clock starting at the current real instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(VirtualState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every delay requested so far, in request order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    /// Total virtual time slept.
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for VirtualScheduler {
    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state();
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        self.origin + self.state().elapsed
    }
}
