//! # Long-Poll Notification Ingestor
//!
//! A self-scheduling ingestor for the pull side of the notification channel.
//! The service holds each pull open until it has something to deliver or its
//! wait window (about 30 seconds) elapses, so the loop simply pulls, routes what
//! came back and pulls again.
//!
//! ## Key Design Principles:
//! - **One pull in flight**: `poll_once` takes `&mut self`; the loop cannot
//!   overlap itself.
//! - **Cooperative pause**: after a successful pull the loop waits a short
//!   base delay so immediate empty answers do not hammer the service.
//! - **Backoff**: after a failure (409 from a competing poller, network errors)
//!   the delay is multiplied by a fixed factor. By default the factor applies
//!   once per failure, counted from the base delay; `compound_backoff` makes it
//!   grow across consecutive failures up to `max_delay`.
//! - **Never terminates on errors**: only the shutdown signal ends the loop.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::core::scheduler::Scheduler;
use crate::devices::remote::NotificationPull;
use crate::devices::router::NotificationRouter;

/// Timing of the long-poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongPollConfig {
    /// Pause after a successful pull.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after a failed pull.
    pub backoff_factor: u32,
    /// Whether the multiplier compounds across consecutive failures.
    pub compound_backoff: bool,
    /// Upper bound for compounded delays.
    pub max_delay: Duration,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            backoff_factor: 10,
            compound_backoff: false,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not started, stopped, or pausing after a successful pull.
    Idle,
    /// A pull is in flight.
    Polling,
    /// Pausing after a failed pull.
    BackingOff,
}

/// # Backoff Policy
///
/// Computes the pause before the next pull from the outcome of the last one.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    factor: u32,
    compound: bool,
    max: Duration,
    current: Duration,
}

impl BackoffPolicy {
    /// Creates a policy starting at the base delay.
    pub fn new(config: &LongPollConfig) -> Self {
        Self {
            base: config.base_delay,
            factor: config.backoff_factor.max(1),
            compound: config.compound_backoff,
            max: config.max_delay,
            current: config.base_delay,
        }
    }

    /// Delay after a successful pull. Resets any accumulated backoff.
    pub fn on_success(&mut self) -> Duration {
        self.current = self.base;
        self.current
    }

    /// Delay after a failed pull.
    pub fn on_failure(&mut self) -> Duration {
        self.current = if self.compound {
            self.current
                .saturating_mul(self.factor)
                .min(self.max.max(self.base))
        } else {
            self.base.saturating_mul(self.factor)
        };
        self.current
    }

    /// The delay most recently handed out.
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// # Long-Poll Loop
///
/// Pulls notification batches and feeds them to the `NotificationRouter`.
pub struct LongPollLoop {
    transport: Arc<dyn NotificationPull>,
    router: Arc<NotificationRouter>,
    scheduler: Arc<dyn Scheduler>,
    policy: BackoffPolicy,
    state: PollState,
}

impl LongPollLoop {
    /// Creates an idle loop.
    pub fn new(
        transport: Arc<dyn NotificationPull>,
        router: Arc<NotificationRouter>,
        scheduler: Arc<dyn Scheduler>,
        config: &LongPollConfig,
    ) -> Self {
        Self {
            transport,
            router,
            scheduler,
            policy: BackoffPolicy::new(config),
            state: PollState::Idle,
        }
    }

    /// The loop's current state.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// # Poll Once
    ///
    /// Performs one pull. On success the whole batch goes to the router; on
    /// failure nothing is routed.
    ///
    /// # Returns
    /// The delay to wait before the next pull.
    pub async fn poll_once(&mut self) -> Duration {
        self.state = PollState::Polling;

        match self.transport.pull().await {
            Ok(batch) => {
                let events = self.router.route(batch.as_ref());
                if !events.is_empty() {
                    log::debug!("Long-poll delivered {} event(s)", events.len());
                }
                self.state = PollState::Idle;
                self.policy.on_success()
            }
            Err(e) => {
                let delay = self.policy.on_failure();
                log::warn!("Long-poll failed: {}. Next attempt in {:?}", e, delay);
                self.state = PollState::BackingOff;
                delay
            }
        }
    }

    /// # Main Execution Loop
    ///
    /// Pull, route, pause, repeat, until `shutdown` fires. Shutdown is observed
    /// both while a pull is in flight and while pausing.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        log::info!("Long-poll loop started.");
        let scheduler = Arc::clone(&self.scheduler);

        loop {
            let delay = tokio::select! {
                _ = shutdown.recv() => break,
                delay = self.poll_once() => delay,
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = scheduler.sleep(delay) => {}
            }
        }

        self.state = PollState::Idle;
        log::info!("Long-poll loop stopped.");
    }
}
