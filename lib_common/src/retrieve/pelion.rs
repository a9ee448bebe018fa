//! # Device Management Service Client
//!
//! `PelionClient` implements every remote collaborator trait of the `devices`
//! module over the service's REST API, authenticated with an API key sent as
//! a bearer token.
//!
//! Two `ApiClient`s are kept. Directory and subscription calls go through the
//! retrying one. Device request submission and notification pulls use one with
//! retries disabled: a retried submission would register a single correlation
//! id for two remote requests, and pull failures are already paced by the
//! long-poll backoff.
//!
//! Device ids and resource paths reach this client from outside (webhook
//! bodies, the REST boundary). Every URL is built segment by segment, so an id
//! can only ever name one path segment of the intended endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::devices::error::DeviceError;
use crate::devices::model::{
    is_valid_device_id, resource_segments, DevicePage, DeviceRequestBody, DeviceResource,
    NotificationResponse, PreSubscription, RegisteredDevice,
};
use crate::devices::remote::{
    DeviceDirectory, DeviceRequests, DeviceResources, NotificationPull, SubscriptionManager,
};
use crate::retrieve::ky_http::{ApiClient, ApiResponse, ClientOptions};

/// Page size of directory listings.
const DEVICE_PAGE_LIMIT: usize = 1000;

/// REST client for the device management service.
pub struct PelionClient {
    api: ApiClient,
    direct: ApiClient,
}

impl PelionClient {
    /// Creates a client for `api_host` authenticated with `api_key`.
    ///
    /// `long_poll_timeout` bounds a single notification pull and device
    /// request submission; it should exceed the service's own long-poll
    /// window.
    ///
    /// # Errors
    /// `DeviceError::Config` if `api_host` is not an absolute URL.
    pub fn new(api_host: &str, api_key: &str, long_poll_timeout: Duration) -> Result<Self, DeviceError> {
        let config_error = |e: anyhow::Error| DeviceError::Config(format!("{:#}", e));
        let api = ApiClient::new(api_host, Some(api_key.to_string())).map_err(config_error)?;
        let direct = ApiClient::with_options(
            api_host,
            Some(api_key.to_string()),
            ClientOptions {
                max_retries: 0,
                timeout: Some(long_poll_timeout),
            },
        )
        .map_err(config_error)?;
        Ok(Self { api, direct })
    }

    /// Absolute URL of `segments` (plus `query`) on the service.
    fn url(client: &ApiClient, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, DeviceError> {
        client
            .endpoint(segments, query)
            .map_err(|e| DeviceError::Config(format!("{:#}", e)))
    }

    async fn call<T, B>(
        client: &ApiClient,
        method: Method,
        url: Url,
        body: Option<B>,
    ) -> Result<Option<T>, DeviceError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let target = url.path().to_string();
        let response: ApiResponse<T> = client
            .request_url(method.clone(), url, None, body)
            .await
            .map_err(|e| DeviceError::Transport(format!("{} {}: {:#}", method, target, e)))?;

        if response.success {
            Ok(response.data)
        } else {
            Err(DeviceError::RequestRejected {
                status: response.status,
                body: response.error_body.unwrap_or_default(),
            })
        }
    }

    async fn send<B: Serialize>(&self, method: Method, segments: &[&str], body: Option<B>) -> Result<(), DeviceError> {
        let url = Self::url(&self.api, segments, &[])?;
        Self::call::<serde_json::Value, B>(&self.api, method, url, body)
            .await
            .map(|_| ())
    }
}

fn device_segment(device_id: &str) -> Result<&str, DeviceError> {
    if is_valid_device_id(device_id) {
        Ok(device_id)
    } else {
        Err(DeviceError::InvalidTarget(format!("device id {:?}", device_id)))
    }
}

#[async_trait]
impl DeviceDirectory for PelionClient {
    async fn list_registered_devices(&self) -> Result<Vec<RegisteredDevice>, DeviceError> {
        let mut devices = Vec::new();
        let mut after: Option<String> = None;

        let limit = DEVICE_PAGE_LIMIT.to_string();

        loop {
            let url = match &after {
                Some(last) => Self::url(
                    &self.api,
                    &["v3", "devices"],
                    &[("limit", limit.as_str()), ("after", last.as_str())],
                )?,
                None => Self::url(&self.api, &["v3", "devices"], &[("limit", limit.as_str())])?,
            };
            let page: DevicePage = Self::call(&self.api, Method::GET, url, None::<()>)
                .await?
                .ok_or_else(|| DeviceError::Transport("GET /v3/devices: empty response".to_string()))?;

            let has_more = page.has_more;
            after = page.data.last().map(|d| d.id.clone());
            let received = page.data.len();
            devices.extend(page.data);

            if !has_more || received == 0 {
                break;
            }
        }

        log::debug!("Device directory listed {} device(s)", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl DeviceResources for PelionClient {
    async fn list_resources(&self, device_id: &str) -> Result<Vec<DeviceResource>, DeviceError> {
        let url = Self::url(&self.api, &["v2", "endpoints", device_segment(device_id)?], &[])?;
        let resources: Option<Vec<DeviceResource>> =
            Self::call(&self.api, Method::GET, url, None::<()>).await?;
        Ok(resources.unwrap_or_default())
    }
}

#[async_trait]
impl DeviceRequests for PelionClient {
    async fn submit_request(
        &self,
        device_id: &str,
        correlation_id: &str,
        body: &DeviceRequestBody,
    ) -> Result<(), DeviceError> {
        let url = Self::url(
            &self.direct,
            &["v2", "device-requests", device_segment(device_id)?],
            &[("async-id", correlation_id)],
        )?;
        Self::call::<serde_json::Value, _>(&self.direct, Method::POST, url, Some(body))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl NotificationPull for PelionClient {
    async fn pull(&self) -> Result<Option<NotificationResponse>, DeviceError> {
        let url = Self::url(&self.direct, &["v2", "notification", "pull"], &[])?;
        Self::call(&self.direct, Method::GET, url, None::<()>).await
    }
}

#[async_trait]
impl SubscriptionManager for PelionClient {
    async fn clear_subscriptions(&self) -> Result<(), DeviceError> {
        self.send(Method::DELETE, &["v2", "subscriptions"], None::<()>).await
    }

    async fn set_pre_subscriptions(&self, entries: &[PreSubscription]) -> Result<(), DeviceError> {
        self.send(Method::PUT, &["v2", "subscriptions"], Some(entries)).await
    }

    async fn subscribe_resource(&self, device_id: &str, path: &str) -> Result<(), DeviceError> {
        let resource = resource_segments(path)
            .ok_or_else(|| DeviceError::InvalidTarget(format!("resource path {:?}", path)))?;
        let mut segments = vec!["v2", "subscriptions", device_segment(device_id)?];
        segments.extend(resource);
        self.send(Method::PUT, &segments, None::<()>).await
    }

    async fn delete_webhook(&self) -> Result<(), DeviceError> {
        self.send(Method::DELETE, &["v2", "notification", "callback"], None::<()>).await
    }

    async fn register_webhook(&self, url: &str) -> Result<(), DeviceError> {
        let body = json!({
            "url": url,
            "serialization": {
                "type": "v2",
                "cfg": { "include_timestamp": true }
            }
        });
        self.send(Method::PUT, &["v2", "notification", "callback"], Some(body)).await
    }
}
