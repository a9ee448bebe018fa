//! # Device Data Model
//!
//! Wire types exchanged with the device management service plus the
//! normalized `NotificationEvent` this library produces. Field names follow the
//! service's JSON (kebab-case where the service uses it).

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::devices::error::NotificationError;

/// How notifications reach this process. Chosen once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    /// The service calls back into this process (webhook).
    Push,
    /// This process repeatedly pulls pending notifications (long-poll).
    Pull,
}

impl TransportMode {
    /// Maps the `LONG_POLLING_ENABLED` switch onto a mode.
    pub fn from_long_polling(enabled: bool) -> Self {
        if enabled {
            TransportMode::Pull
        } else {
            TransportMode::Push
        }
    }
}

/// The kind of operation requested on a device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Read the current value (`GET`).
    Read,
    /// Write a new value (`PUT`).
    Write,
    /// Execute the resource (`POST`).
    Execute,
}

impl RequestMethod {
    /// The verb the device-requests API expects in the request body.
    pub fn as_verb(&self) -> &'static str {
        match self {
            RequestMethod::Read => "GET",
            RequestMethod::Write => "PUT",
            RequestMethod::Execute => "POST",
        }
    }
}

/// # Correlation Entry
///
/// Context remembered for one in-flight device request so that its
/// asynchronous response, which only carries `correlation_id`, can be mapped
/// back to a device and resource path. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationEntry {
    /// Locally generated id sent as `async-id`.
    pub correlation_id: String,
    /// Device the request was sent to.
    pub device_id: String,
    /// Resource path the request targeted, e.g. `/3303/0/5700`.
    pub path: String,
}

/// # Notification Event
///
/// The normalized output of the subsystem: a resource on a device now has a
/// numeric value. `timestamp` is the delivery time, not the device time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    /// Device the value belongs to.
    pub device_id: String,
    /// Resource path in LwM2M URI form.
    pub path: String,
    /// The decoded, validated numeric value.
    pub payload: f64,
    /// The decoded payload text exactly as the device sent it.
    pub text: String,
    /// When this process accepted the value.
    pub timestamp: DateTime<Utc>,
}

/// A subscription notification: the resource changed and was pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Endpoint (device) id.
    #[serde(default)]
    pub ep: String,
    /// Resource path.
    #[serde(default)]
    pub path: String,
    /// Base64 encoded value.
    #[serde(default)]
    pub payload: Option<String>,
    /// Content type reported by the device.
    #[serde(default)]
    pub ct: Option<String>,
    /// Seconds the value stays valid, when the device reports it.
    #[serde(rename = "max-age", default)]
    pub max_age: Option<u64>,
}

/// An answer to a previously dispatched device request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncResponse {
    /// The `async-id` the request was submitted with.
    pub id: String,
    /// Device-side status code (CoAP mapped to HTTP).
    #[serde(default)]
    pub status: Option<u16>,
    /// Base64 encoded value, absent for writes and executes.
    #[serde(default)]
    pub payload: Option<String>,
    /// Error text reported by the service.
    #[serde(default)]
    pub error: Option<String>,
    /// Content type reported by the device.
    #[serde(default)]
    pub ct: Option<String>,
    /// Seconds the value stays valid, when the device reports it.
    #[serde(rename = "max-age", default)]
    pub max_age: Option<u64>,
}

/// # Notification Response
///
/// One raw batch as delivered by either transport. Categories the router does
/// not handle (registrations, de-registrations, ...) are ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    /// Subscription notifications, in delivery order.
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Device-request responses, in delivery order.
    #[serde(rename = "async-responses", default)]
    pub async_responses: Vec<AsyncResponse>,
}

impl NotificationResponse {
    /// True when the batch carries nothing this library routes.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.async_responses.is_empty()
    }
}

/// A device as listed by the device directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    /// Device id.
    pub id: String,
    /// Human readable name; the directory may return `null`.
    #[serde(default)]
    pub name: Option<String>,
    /// Registration state, `registered` for connected devices.
    #[serde(default)]
    pub state: String,
}

impl RegisteredDevice {
    /// True when the device is currently connected to the service.
    pub fn is_registered(&self) -> bool {
        self.state == "registered"
    }
}

/// One page of the device directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DevicePage {
    /// Devices on this page.
    #[serde(default)]
    pub data: Vec<RegisteredDevice>,
    /// Whether another page follows.
    #[serde(default)]
    pub has_more: bool,
}

/// # Device Resource
///
/// A resource exposed by a device. Only `uri` is interpreted; every other field
/// is kept verbatim so the raw listing can be persisted unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResource {
    /// Resource path, e.g. `/3303/0/5700`.
    pub uri: String,
    /// Every other attribute of the listing entry (`rt`, `obs`, `type`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceResource {
    /// A resource with no extra attributes.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Body of `POST v2/device-requests/{device_id}?async-id=...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequestBody {
    /// `GET`, `PUT` or `POST`.
    pub method: String,
    /// Resource path.
    pub uri: String,
    /// Base64 encoded payload for writes and executes.
    #[serde(rename = "payload-b64", skip_serializing_if = "Option::is_none", default)]
    pub payload_b64: Option<String>,
}

impl DeviceRequestBody {
    /// Builds the body for `method` on `path`, encoding `payload` when present.
    pub fn new(method: RequestMethod, path: &str, payload: Option<&str>) -> Self {
        Self {
            method: method.as_verb().to_string(),
            uri: path.to_string(),
            payload_b64: payload.map(encode_payload),
        }
    }
}

/// Pre-subscription entry for `PUT v2/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSubscription {
    /// Device id pattern.
    #[serde(rename = "endpoint-name")]
    pub endpoint_name: String,
    /// Resource path patterns.
    #[serde(rename = "resource-path")]
    pub resource_path: Vec<String>,
}

/// Base64 encodes a text payload for the wire.
pub fn encode_payload(text: &str) -> String {
    general_purpose::STANDARD.encode(text.as_bytes())
}

/// Decodes a base64 payload back to text.
pub fn decode_payload(encoded: &str) -> Result<String, NotificationError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| NotificationError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| NotificationError::Decode(e.to_string()))
}

/// Whether `id` can be used as a single URL path segment naming a device:
/// non-empty, not a dot segment and free of `/`.
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

/// Splits a resource path such as `/3303/0/5700` into its segments.
/// `None` for an empty path or one with dot segments.
pub fn resource_segments(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
        return None;
    }
    Some(segments)
}

/// Parses decoded text as a finite number; surrounding whitespace is ignored.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_serializes_with_kebab_payload_key() {
        let body = DeviceRequestBody::new(RequestMethod::Write, "/3311/0/5850", Some("1"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["method"], "PUT");
        assert_eq!(json["uri"], "/3311/0/5850");
        assert_eq!(json["payload-b64"], "MQ==");
    }

    #[test]
    fn test_read_body_omits_payload() {
        let body = DeviceRequestBody::new(RequestMethod::Read, "/3303/0/5700", None);
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("payload-b64"));
        assert!(json.contains("\"GET\""));
    }

    #[test]
    fn test_notification_response_ignores_other_categories() {
        let raw = serde_json::json!({
            "notifications": [{"ep": "dev1", "path": "/3303/0/5700", "payload": "MjEuNQ==", "max-age": 60}],
            "registrations": [{"ep": "dev9"}],
            "async-responses": [{"id": "X", "status": 200, "payload": "Nw==", "max-age": null}]
        });
        let parsed: NotificationResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.notifications.len(), 1);
        assert_eq!(parsed.notifications[0].max_age, Some(60));
        assert_eq!(parsed.async_responses[0].id, "X");
        assert_eq!(parsed.async_responses[0].max_age, None);
    }

    #[test]
    fn test_resource_keeps_unknown_fields() {
        let raw = serde_json::json!({"uri": "/3303/0/5700", "rt": "temperature", "obs": true});
        let res: DeviceResource = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(res.uri, "/3303/0/5700");
        assert_eq!(serde_json::to_value(&res).unwrap(), raw);
    }

    #[test]
    fn test_device_id_must_be_one_segment() {
        assert!(is_valid_device_id("0170a3b4c5d6"));
        assert!(is_valid_device_id("dev1?x="));
        assert!(!is_valid_device_id(""));
        assert!(!is_valid_device_id(".."));
        assert!(!is_valid_device_id("../../v3/api-keys"));
    }

    #[test]
    fn test_resource_segments() {
        assert_eq!(resource_segments("/3303/0/5700"), Some(vec!["3303", "0", "5700"]));
        assert_eq!(resource_segments("/"), None);
        assert_eq!(resource_segments("/3303/../../v3"), None);
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("21.5"), Some(21.5));
        assert_eq!(parse_numeric(" 7 "), Some(7.0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric("NaN"), None);
    }

    #[test]
    fn test_decode_payload_rejects_garbage() {
        assert_eq!(decode_payload("MjEuNQ==").unwrap(), "21.5");
        assert!(decode_payload("%%%").is_err());
    }
}
