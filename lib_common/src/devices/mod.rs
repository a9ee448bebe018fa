//! # Device Telemetry Module
//!
//! This module holds everything needed to turn the device management service's
//! asynchronous traffic into one ordered stream of "device resource now has
//! value V" events.
//!
//! ## Purpose:
//! Outbound device requests are tagged with a locally generated correlation id
//! and answered much later, out of order, through a notification channel that
//! only carries that id. Subscription notifications arrive on the same channel
//! but carry the device and path directly. The components here match the two
//! categories back together regardless of which transport (push callback or
//! long-poll pull) delivered them.
//!
//! ## Contained Modules:
//! - **`model`**: Wire types of the remote service and the normalized
//!   `NotificationEvent`.
//! - **`error`**: `DeviceError` and `NotificationError`.
//! - **`wildcard`**: Trailing-wildcard pattern matching for device and resource
//!   filters.
//! - **`correlation`**: The in-memory `CorrelationStore` and id generator.
//! - **`remote`**: Collaborator traits for the remote service.
//! - **`requests`**: `RequestDispatcher`, which tags and submits device requests.
//! - **`router`**: `NotificationRouter`, which resolves raw notification batches.
//! - **`sink`**: The persistence collaborator trait and the event forwarder.
//! - **`subscriptions`**: Start-up subscription and notification channel setup.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Wire types and normalized events.
pub mod model;
/// Error taxonomy for device traffic.
pub mod error;
/// Trailing-wildcard filters.
pub mod wildcard;
/// Outstanding request table keyed by correlation id.
pub mod correlation;
/// Traits for the remote service collaborators.
pub mod remote;
/// Outbound device request dispatch.
pub mod requests;
/// Inbound notification resolution.
pub mod router;
/// Persistence collaborator and event forwarding.
pub mod sink;
/// Subscription and notification channel setup.
pub mod subscriptions;

// --- Public API Re-exports ---
pub use correlation::{CorrelationIdGenerator, CorrelationStore};
pub use error::{DeviceError, NotificationError};
pub use model::{
    is_valid_device_id, AsyncResponse, CorrelationEntry, DeviceRequestBody, DeviceResource,
    Notification, NotificationEvent, NotificationResponse, RegisteredDevice, RequestMethod,
    TransportMode,
};
pub use remote::{DeviceDirectory, DeviceRequests, DeviceResources, NotificationPull, SubscriptionManager};
pub use requests::RequestDispatcher;
pub use router::NotificationRouter;
pub use sink::{forward_events, EventSink};
pub use subscriptions::ChannelSetup;
pub use wildcard::{matches, matches_any, PatternSet};
