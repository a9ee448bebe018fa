//! # Project Tests
//!
//! Cross-crate tests for `lib_common` live in `tests/`. This library only
//! carries the fixtures they share.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// In-process stand-in for the device management service.
pub mod mock_service;
