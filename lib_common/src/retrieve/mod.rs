//! # Data Retrieval Module
//!
//! HTTP clients for the outside world.
//!
//! ## Purpose:
//! Networking concerns (URL building, bearer authentication, retries, JSON
//! handling) live here so the `devices` components only ever see their
//! collaborator traits.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, featuring automatic retries with exponential
//!   backoff.
//! - **`pelion`**: `PelionClient`, the device management service client
//!   implementing the `devices::remote` traits on top of `ApiClient`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// REST client for the device management service.
pub mod pelion;

// --- Public API Re-exports ---
pub use ky_http::{ApiClient, ApiResponse, ClientOptions};
pub use pelion::PelionClient;
