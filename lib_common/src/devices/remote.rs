//! # Remote Service Collaborators
//!
//! The device management service seen from this library. `PelionClient` in
//! the `retrieve` module implements all of these over REST; tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use crate::devices::error::DeviceError;
use crate::devices::model::{
    DeviceRequestBody, DeviceResource, NotificationResponse, PreSubscription, RegisteredDevice,
};

/// Lists devices known to the service.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Every device in the directory with its registration state.
    async fn list_registered_devices(&self) -> Result<Vec<RegisteredDevice>, DeviceError>;
}

/// Lists the resources a device exposes.
#[async_trait]
pub trait DeviceResources: Send + Sync {
    /// Resources of one connected device.
    async fn list_resources(&self, device_id: &str) -> Result<Vec<DeviceResource>, DeviceError>;
}

/// Queues device requests tagged with a correlation id.
#[async_trait]
pub trait DeviceRequests: Send + Sync {
    /// Submits `body` for `device_id`. `Ok` only means the service queued it;
    /// the answer arrives later as an async response carrying `correlation_id`.
    async fn submit_request(
        &self,
        device_id: &str,
        correlation_id: &str,
        body: &DeviceRequestBody,
    ) -> Result<(), DeviceError>;
}

/// The pull side of the notification channel.
#[async_trait]
pub trait NotificationPull: Send + Sync {
    /// Waits for pending notifications. `None` means the service's wait window
    /// elapsed with nothing to deliver.
    async fn pull(&self) -> Result<Option<NotificationResponse>, DeviceError>;
}

/// Subscription and webhook management.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Removes every subscription and pre-subscription.
    async fn clear_subscriptions(&self) -> Result<(), DeviceError>;
    /// Replaces the pre-subscription list.
    async fn set_pre_subscriptions(&self, entries: &[PreSubscription]) -> Result<(), DeviceError>;
    /// Subscribes to one resource on a connected device.
    async fn subscribe_resource(&self, device_id: &str, path: &str) -> Result<(), DeviceError>;
    /// Removes the registered webhook, if any.
    async fn delete_webhook(&self) -> Result<(), DeviceError>;
    /// Registers `url` as the push callback.
    async fn register_webhook(&self, url: &str) -> Result<(), DeviceError>;
}
