//! # Device Error Types
//!
//! `DeviceError` is what crosses module boundaries: a remote call was rejected
//! or could not be completed. `NotificationError` describes why a single
//! inbound entry was discarded; the router logs it and moves on.

use thiserror::Error;

/// Failures talking to the device management service.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The service answered with a non-success status.
    #[error("Request rejected by remote service (status {status}): {body}")]
    RequestRejected {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the service, if any.
        body: String,
    },
    /// The call could not be completed or its answer could not be decoded.
    #[error("Transport failure: {0}")]
    Transport(String),
    /// A device id or resource path cannot be addressed on the service.
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),
    /// The client was built with unusable settings.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Reasons an inbound notification entry produces no event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Payload missing, empty, undecodable or not numeric.
    #[error("Malformed notification for {device_id} {path}: {reason}")]
    Malformed {
        /// Device the entry referred to.
        device_id: String,
        /// Resource path the entry referred to.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
    /// No outstanding request carries this correlation id.
    #[error("No outstanding request for async id {correlation_id}")]
    Unmatched {
        /// The id carried by the response.
        correlation_id: String,
    },
    /// Base64 or UTF-8 decoding failed.
    #[error("Payload decode failed: {0}")]
    Decode(String),
}
