//! # Core Module
//!
//! Runtime plumbing shared by the ingestors. At the moment that is the
//! `Scheduler` abstraction: every pause the long-poll loop and the resource
//! poller take goes through it.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Injectable sleep and clock.
pub mod scheduler;

// --- Public API Re-exports ---
pub use scheduler::{Scheduler, TokioScheduler, VirtualScheduler};
