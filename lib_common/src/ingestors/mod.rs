//! # Data Ingestors Module
//!
//! The self-scheduling tasks that keep device values flowing into the system.
//!
//! ## Purpose:
//! Each ingestor owns a loop with its own timing and is started once by the
//! server binary. Both pause through the `core::Scheduler`, so their schedules
//! can be checked in tests without waiting on a real clock.
//!
//! ## Contained Modules:
//! - **`long_poll`**: Pulls notification batches when no public callback URL is
//!   available, with backoff after failures.
//! - **`resource_poller`**: Periodically reads every matching resource on every
//!   matching device, paced per device.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The long-poll notification loop.
pub mod long_poll;
/// The periodic resource read cycle.
pub mod resource_poller;

// --- Public API Re-exports ---
pub use long_poll::{BackoffPolicy, LongPollConfig, LongPollLoop, PollState};
pub use resource_poller::{CycleReport, PollerConfig, ResourcePoller};
