//! # Request Dispatcher
//!
//! Issues read, write and execute requests against device resources. Every
//! request gets a fresh correlation id and a `CorrelationEntry`; nothing here
//! waits for the device's answer; that comes back through the notification
//! channel and is resolved by the `NotificationRouter`.

use std::sync::Arc;

use crate::devices::correlation::{CorrelationIdGenerator, CorrelationStore};
use crate::devices::error::DeviceError;
use crate::devices::model::{is_valid_device_id, CorrelationEntry, DeviceRequestBody, RequestMethod};
use crate::devices::remote::DeviceRequests;

/// Tags outbound device requests and records them for later matching.
pub struct RequestDispatcher {
    requests: Arc<dyn DeviceRequests>,
    store: Arc<CorrelationStore>,
    ids: CorrelationIdGenerator,
}

impl RequestDispatcher {
    /// Creates a dispatcher submitting through `requests` and tracking in `store`.
    pub fn new(requests: Arc<dyn DeviceRequests>, store: Arc<CorrelationStore>) -> Self {
        Self {
            requests,
            store,
            ids: CorrelationIdGenerator::new(),
        }
    }

    /// The store this dispatcher registers requests in.
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// # Dispatch
    ///
    /// Sends `method` on `device_id`/`path` with an optional text `payload`.
    ///
    /// The correlation entry is stored before the request goes out, so a
    /// response that overtakes the HTTP reply still resolves. It stays stored
    /// when the service rejects the call: the queue may accept and fail
    /// asynchronously, and a late answer is still worth matching.
    ///
    /// A `device_id` that cannot name a single URL path segment is refused
    /// with `DeviceError::InvalidTarget` before anything is stored.
    ///
    /// # Returns
    /// The correlation id on acceptance, `DeviceError::RequestRejected` (or
    /// `Transport`) otherwise.
    pub async fn dispatch(
        &self,
        device_id: &str,
        path: &str,
        payload: Option<&str>,
        method: RequestMethod,
    ) -> Result<String, DeviceError> {
        if !is_valid_device_id(device_id) {
            log::warn!("Refusing request for invalid device id {:?}", device_id);
            return Err(DeviceError::InvalidTarget(format!("device id {:?}", device_id)));
        }
        let correlation_id = self.ids.next_id();
        let body = DeviceRequestBody::new(method, path, payload);

        self.store.insert(CorrelationEntry {
            correlation_id: correlation_id.clone(),
            device_id: device_id.to_string(),
            path: path.to_string(),
        });

        log::info!(
            "{} {} {} (async id {})",
            body.method,
            device_id,
            path,
            correlation_id
        );

        match self.requests.submit_request(device_id, &correlation_id, &body).await {
            Ok(()) => Ok(correlation_id),
            Err(e) => {
                log::error!("{} {} {} failed: {}", body.method, device_id, path, e);
                Err(e)
            }
        }
    }
}
