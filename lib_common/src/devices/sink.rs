//! # Event Sink
//!
//! The persistence collaborator. Calls are fire-and-forget: implementations log
//! their own failures and never report them back into the notification flow.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::devices::model::{NotificationEvent, RegisteredDevice};

/// Where resolved events and device metadata end up.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Stores one resolved value.
    async fn record_event(&self, event: &NotificationEvent);
    /// Inserts or updates a device's directory entry (name and state).
    async fn upsert_device_directory(&self, device: &RegisteredDevice);
    /// Stores the raw resource listing of a device.
    async fn upsert_device_resources(&self, device_id: &str, resources_json: &str);
}

/// # Forward Events
///
/// Drains the router's event channel into `sink`, one event at a time, until
/// the channel closes or `shutdown` fires. Events already queued when shutdown
/// arrives are not flushed.
pub async fn forward_events(
    sink: Arc<dyn EventSink>,
    mut events: mpsc::UnboundedReceiver<NotificationEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    log::info!("Event forwarder started.");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Event forwarder received shutdown signal.");
                break;
            }
            next = events.recv() => match next {
                Some(event) => sink.record_event(&event).await,
                None => {
                    log::info!("Event channel closed, forwarder exiting.");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<NotificationEvent>>,
    }

    #[async_trait]
    impl EventSink for MemorySink {
        async fn record_event(&self, event: &NotificationEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
        async fn upsert_device_directory(&self, _device: &RegisteredDevice) {}
        async fn upsert_device_resources(&self, _device_id: &str, _resources_json: &str) {}
    }

    fn event(value: f64) -> NotificationEvent {
        NotificationEvent {
            device_id: "dev1".to_string(),
            path: "/3303/0/5700".to_string(),
            payload: value,
            text: value.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_forwarder_preserves_order_and_exits_on_close() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for v in [1.0, 2.0, 3.0] {
            tx.send(event(v)).unwrap();
        }
        drop(tx);

        forward_events(sink.clone(), rx, shutdown_rx).await;
        let values: Vec<f64> = sink.events.lock().unwrap().iter().map(|e| e.payload).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_forwarder_stops_on_shutdown() {
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = mpsc::unbounded_channel::<NotificationEvent>();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(forward_events(sink, rx, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("forwarder did not stop")
            .unwrap();
    }
}
