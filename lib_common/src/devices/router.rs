//! # Notification Router
//!
//! Turns one raw notification batch, from either transport, into zero or more
//! `NotificationEvent`s and forwards them to the persistence side.
//!
//! ## Per batch:
//! 1. An absent or empty batch produces nothing.
//! 2. Each subscription notification carries its own device and path; the
//!    payload is base64 decoded and must parse as a number.
//! 3. Each async response is matched by id against the `CorrelationStore`
//!    (find-and-remove). Unknown ids are dropped quietly: they belong to an
//!    earlier process or were already delivered. Matched entries go through the
//!    same payload validation as step 2.
//!
//! Notifications are handled before async responses; each category keeps its
//! delivery order. Routing is synchronous and never retries.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::devices::correlation::CorrelationStore;
use crate::devices::error::NotificationError;
use crate::devices::model::{decode_payload, parse_numeric, NotificationEvent, NotificationResponse};

/// Resolves raw notification batches into events.
pub struct NotificationRouter {
    store: Arc<CorrelationStore>,
    events: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationRouter {
    /// Creates a router resolving async responses against `store` and
    /// forwarding events into `events`.
    pub fn new(store: Arc<CorrelationStore>, events: mpsc::UnboundedSender<NotificationEvent>) -> Self {
        Self { store, events }
    }

    /// # Route
    ///
    /// Resolves `raw` and forwards every resulting event.
    ///
    /// # Returns
    /// The events that were forwarded, in forwarding order.
    pub fn route(&self, raw: Option<&NotificationResponse>) -> Vec<NotificationEvent> {
        let events = self.resolve(raw);
        for event in &events {
            if self.events.send(event.clone()).is_err() {
                log::debug!(
                    "Event sink closed, dropping {} {} {}",
                    event.device_id,
                    event.path,
                    event.payload
                );
            }
        }
        events
    }

    /// Resolves `raw` into events without forwarding them. Matched async
    /// responses are still removed from the store.
    pub fn resolve(&self, raw: Option<&NotificationResponse>) -> Vec<NotificationEvent> {
        let Some(batch) = raw else {
            return Vec::new();
        };
        if batch.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(batch.notifications.len() + batch.async_responses.len());

        for n in &batch.notifications {
            match build_event(&n.ep, &n.path, n.payload.as_deref()) {
                Ok(event) => events.push(event),
                Err(e) => log::info!("{}", e),
            }
        }

        for response in &batch.async_responses {
            let Some(entry) = self.store.take_by_id(&response.id) else {
                log::debug!(
                    "{}",
                    NotificationError::Unmatched {
                        correlation_id: response.id.clone()
                    }
                );
                continue;
            };
            if let Some(error) = &response.error {
                log::warn!(
                    "Async response {} for {} {} reported: {} (status {:?})",
                    response.id,
                    entry.device_id,
                    entry.path,
                    error,
                    response.status
                );
            }
            match build_event(&entry.device_id, &entry.path, response.payload.as_deref()) {
                Ok(event) => events.push(event),
                Err(e) => log::info!("{}", e),
            }
        }

        events
    }
}

/// Validates one payload and wraps it as an event.
fn build_event(
    device_id: &str,
    path: &str,
    payload: Option<&str>,
) -> Result<NotificationEvent, NotificationError> {
    let malformed = |reason: String| NotificationError::Malformed {
        device_id: device_id.to_string(),
        path: path.to_string(),
        reason,
    };

    if device_id.is_empty() || path.is_empty() {
        return Err(malformed("missing device id or path".to_string()));
    }
    let encoded = payload.ok_or_else(|| malformed("no payload".to_string()))?;
    let text = decode_payload(encoded).map_err(|e| malformed(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(malformed("Empty Payload".to_string()));
    }
    let value = parse_numeric(&text).ok_or_else(|| malformed(format!("non-numeric payload {:?}", text)))?;

    Ok(NotificationEvent {
        device_id: device_id.to_string(),
        path: path.to_string(),
        payload: value,
        text,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::model::{encode_payload, AsyncResponse, CorrelationEntry, Notification};

    fn router() -> (NotificationRouter, Arc<CorrelationStore>, mpsc::UnboundedReceiver<NotificationEvent>) {
        let store = Arc::new(CorrelationStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (NotificationRouter::new(Arc::clone(&store), tx), store, rx)
    }

    fn notification(ep: &str, path: &str, text: &str) -> Notification {
        Notification {
            ep: ep.to_string(),
            path: path.to_string(),
            payload: Some(encode_payload(text)),
            ..Default::default()
        }
    }

    fn async_response(id: &str, text: &str) -> AsyncResponse {
        AsyncResponse {
            id: id.to_string(),
            status: Some(200),
            payload: Some(encode_payload(text)),
            ..Default::default()
        }
    }

    #[test]
    fn test_absent_or_empty_batch_produces_nothing() {
        let (router, _, mut rx) = router();
        assert!(router.route(None).is_empty());
        assert!(router.route(Some(&NotificationResponse::default())).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscription_notification_becomes_event() {
        let (router, _, mut rx) = router();
        let batch = NotificationResponse {
            notifications: vec![notification("dev1", "/3303/0/5700", "21.5")],
            ..Default::default()
        };

        let events = router.route(Some(&batch));
        assert_eq!(events.len(), 1);

        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.device_id, "dev1");
        assert_eq!(forwarded.path, "/3303/0/5700");
        assert_eq!(forwarded.payload, 21.5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_keeps_device_text() {
        let (router, _, mut rx) = router();
        let batch = NotificationResponse {
            notifications: vec![
                notification("dev1", "/3303/0/5700", "21.50"),
                notification("dev1", "/3303/0/5601", "1e3"),
            ],
            ..Default::default()
        };

        router.route(Some(&batch));
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.text.as_str(), first.payload), ("21.50", 21.5));
        assert_eq!((second.text.as_str(), second.payload), ("1e3", 1000.0));
    }

    #[test]
    fn test_async_response_resolves_once() {
        let (router, store, mut rx) = router();
        store.insert(CorrelationEntry {
            correlation_id: "X".to_string(),
            device_id: "dev2".to_string(),
            path: "/3306/0/5700".to_string(),
        });
        let batch = NotificationResponse {
            async_responses: vec![async_response("X", "7")],
            ..Default::default()
        };

        router.route(Some(&batch));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.device_id, "dev2");
        assert_eq!(event.path, "/3306/0/5700");
        assert_eq!(event.payload, 7.0);
        assert!(store.is_empty());

        // Duplicate delivery.
        assert!(router.route(Some(&batch)).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unmatched_async_response_is_dropped() {
        let (router, store, _rx) = router();
        store.insert(CorrelationEntry {
            correlation_id: "kept".to_string(),
            device_id: "dev2".to_string(),
            path: "/3306/0/5700".to_string(),
        });
        let batch = NotificationResponse {
            async_responses: vec![async_response("stale", "7")],
            ..Default::default()
        };
        assert!(router.route(Some(&batch)).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_and_non_numeric_payloads_are_discarded() {
        let (router, _, mut rx) = router();
        let mut missing = notification("dev1", "/3303/0/5700", "");
        missing.payload = None;
        let batch = NotificationResponse {
            notifications: vec![
                notification("dev1", "/3303/0/5700", ""),
                notification("dev1", "/3303/0/5700", "abc"),
                missing,
                notification("", "/3303/0/5700", "1"),
            ],
            ..Default::default()
        };
        assert!(router.route(Some(&batch)).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_async_response_still_consumes_entry() {
        let (router, store, _rx) = router();
        store.insert(CorrelationEntry {
            correlation_id: "W".to_string(),
            device_id: "dev3".to_string(),
            path: "/3311/0/5850".to_string(),
        });
        let batch = NotificationResponse {
            async_responses: vec![AsyncResponse {
                id: "W".to_string(),
                status: Some(200),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(router.route(Some(&batch)).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_category_order_is_preserved() {
        let (router, store, _rx) = router();
        for (id, device) in [("a", "devA"), ("b", "devB")] {
            store.insert(CorrelationEntry {
                correlation_id: id.to_string(),
                device_id: device.to_string(),
                path: "/3303/0/5700".to_string(),
            });
        }
        let batch = NotificationResponse {
            notifications: vec![
                notification("n1", "/3303/0/5700", "1"),
                notification("n2", "/3303/0/5700", "2"),
            ],
            async_responses: vec![async_response("b", "4"), async_response("a", "3")],
        };

        let order: Vec<String> = router
            .route(Some(&batch))
            .into_iter()
            .map(|e| e.device_id)
            .collect();
        assert_eq!(order, vec!["n1", "n2", "devB", "devA"]);
    }

    #[test]
    fn test_closed_sink_does_not_panic() {
        let (router, _, rx) = router();
        drop(rx);
        let batch = NotificationResponse {
            notifications: vec![notification("dev1", "/3303/0/5700", "1")],
            ..Default::default()
        };
        assert_eq!(router.route(Some(&batch)).len(), 1);
    }
}
