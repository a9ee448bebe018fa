//! # lib_common
//!
//! Shared building blocks for the device telemetry server. Folders map to
//! cargo features, so dependents only compile what they use:
//!
//! - `devices`: model, filters, correlation, dispatch, routing (plus `core`
//!   and `ingestors`, which build on it).
//! - `retrieve`: HTTP clients, including the device management service client.
//! - `connections`: the PostgreSQL event sink.
//! - `loggers`: process logging.

#[cfg(feature = "devices")]
pub mod core;
#[cfg(feature = "devices")]
pub mod devices;
#[cfg(feature = "devices")]
pub mod ingestors;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "loggers")]
pub mod loggers;
