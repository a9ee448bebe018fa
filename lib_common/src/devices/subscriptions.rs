//! # Channel Setup
//!
//! Start-up configuration of the notification channel: subscriptions for the
//! configured device/resource filters and either a webhook (push) or nothing
//! further (pull; the long-poll loop is started by the caller).
//!
//! Every step is best effort. A failing call is logged and setup moves on, so a
//! process with a half-configured channel still runs its resource poller.

use std::sync::Arc;

use crate::devices::model::{PreSubscription, TransportMode};
use crate::devices::remote::{DeviceDirectory, DeviceResources, SubscriptionManager};
use crate::devices::wildcard::PatternSet;

/// Configures subscriptions and the notification channel.
pub struct ChannelSetup {
    directory: Arc<dyn DeviceDirectory>,
    resources: Arc<dyn DeviceResources>,
    subscriptions: Arc<dyn SubscriptionManager>,
    device_patterns: PatternSet,
    resource_patterns: PatternSet,
}

impl ChannelSetup {
    /// Creates a setup routine for the given filters.
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        resources: Arc<dyn DeviceResources>,
        subscriptions: Arc<dyn SubscriptionManager>,
        device_patterns: PatternSet,
        resource_patterns: PatternSet,
    ) -> Self {
        Self {
            directory,
            resources,
            subscriptions,
            device_patterns,
            resource_patterns,
        }
    }

    /// One pre-subscription per device pattern, each carrying every resource pattern.
    pub fn pre_subscriptions(&self) -> Vec<PreSubscription> {
        self.device_patterns
            .patterns()
            .iter()
            .map(|device| PreSubscription {
                endpoint_name: device.clone(),
                resource_path: self.resource_patterns.patterns().to_vec(),
            })
            .collect()
    }

    /// # Configure
    ///
    /// 1. Clear existing subscriptions.
    /// 2. Set pre-subscriptions for devices that register later.
    /// 3. Subscribe matching resources on devices already registered.
    /// 4. Remove any old webhook.
    /// 5. In `Push` mode, register `webhook_url`.
    ///
    /// # Returns
    /// Number of resource subscriptions created in step 3.
    pub async fn configure(&self, mode: TransportMode, webhook_url: &str) -> usize {
        log::info!("Updating subscriptions");
        if let Err(e) = self.subscriptions.clear_subscriptions().await {
            log::error!("Failed to clear subscriptions: {}", e);
        }

        log::info!("Setting pre-subscriptions");
        if let Err(e) = self.subscriptions.set_pre_subscriptions(&self.pre_subscriptions()).await {
            log::error!("Failed to set pre-subscriptions: {}", e);
        }

        log::info!("Setting subscriptions on registered devices");
        let subscribed = self.subscribe_registered().await;
        log::info!("Subscriptions updated ({} resources)", subscribed);

        if let Err(e) = self.subscriptions.delete_webhook().await {
            log::debug!("No webhook removed: {}", e);
        }

        match mode {
            TransportMode::Pull => log::info!("Using long-polling"),
            TransportMode::Push => match self.subscriptions.register_webhook(webhook_url).await {
                Ok(()) => log::info!("Using webhook \"{}\"", webhook_url),
                Err(e) => log::error!("Failed to register webhook {}: {}", webhook_url, e),
            },
        }

        subscribed
    }

    async fn subscribe_registered(&self) -> usize {
        let devices = match self.directory.list_registered_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("Failed to list registered devices: {}", e);
                return 0;
            }
        };

        let mut subscribed = 0;
        for device in devices
            .iter()
            .filter(|d| d.is_registered() && self.device_patterns.matches(&d.id))
        {
            let resources = match self.resources.list_resources(&device.id).await {
                Ok(resources) => resources,
                Err(e) => {
                    log::warn!("Failed to list resources on {}: {}", device.id, e);
                    continue;
                }
            };
            for resource in resources.iter().filter(|r| self.resource_patterns.matches(&r.uri)) {
                match self.subscriptions.subscribe_resource(&device.id, &resource.uri).await {
                    Ok(()) => subscribed += 1,
                    Err(e) => log::warn!("Failed to subscribe {} {}: {}", device.id, resource.uri, e),
                }
            }
        }
        subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::error::DeviceError;
    use crate::devices::model::{DeviceResource, RegisteredDevice};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeService {
        calls: Mutex<Vec<String>>,
        fail_clear: bool,
    }

    impl FakeService {
        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DeviceDirectory for FakeService {
        async fn list_registered_devices(&self) -> Result<Vec<RegisteredDevice>, DeviceError> {
            Ok(vec![
                RegisteredDevice {
                    id: "016a01".to_string(),
                    name: Some("sensor".to_string()),
                    state: "registered".to_string(),
                },
                RegisteredDevice {
                    id: "016a02".to_string(),
                    name: None,
                    state: "deregistered".to_string(),
                },
                RegisteredDevice {
                    id: "ffff01".to_string(),
                    name: None,
                    state: "registered".to_string(),
                },
            ])
        }
    }

    #[async_trait]
    impl DeviceResources for FakeService {
        async fn list_resources(&self, _device_id: &str) -> Result<Vec<DeviceResource>, DeviceError> {
            Ok(vec![
                DeviceResource::new("/3303/0/5700"),
                DeviceResource::new("/3303/0/5701"),
                DeviceResource::new("/1/0/1"),
            ])
        }
    }

    #[async_trait]
    impl SubscriptionManager for FakeService {
        async fn clear_subscriptions(&self) -> Result<(), DeviceError> {
            self.log("clear".to_string());
            if self.fail_clear {
                return Err(DeviceError::Transport("down".to_string()));
            }
            Ok(())
        }
        async fn set_pre_subscriptions(&self, entries: &[PreSubscription]) -> Result<(), DeviceError> {
            self.log(format!("pre {}", entries.len()));
            Ok(())
        }
        async fn subscribe_resource(&self, device_id: &str, path: &str) -> Result<(), DeviceError> {
            self.log(format!("sub {} {}", device_id, path));
            Ok(())
        }
        async fn delete_webhook(&self) -> Result<(), DeviceError> {
            self.log("delete-webhook".to_string());
            Ok(())
        }
        async fn register_webhook(&self, url: &str) -> Result<(), DeviceError> {
            self.log(format!("webhook {}", url));
            Ok(())
        }
    }

    fn setup(service: Arc<FakeService>) -> ChannelSetup {
        ChannelSetup::new(
            service.clone(),
            service.clone(),
            service,
            PatternSet::from_csv("016a*"),
            PatternSet::from_csv("/3303/*"),
        )
    }

    #[tokio::test]
    async fn test_push_mode_registers_webhook_after_subscriptions() {
        let service = Arc::new(FakeService::default());
        let subscribed = setup(service.clone())
            .configure(TransportMode::Push, "https://example.org/callback")
            .await;

        assert_eq!(subscribed, 2);
        let calls = service.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "clear",
                "pre 1",
                "sub 016a01 /3303/0/5700",
                "sub 016a01 /3303/0/5701",
                "delete-webhook",
                "webhook https://example.org/callback",
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_mode_skips_webhook_and_survives_failures() {
        let service = Arc::new(FakeService {
            fail_clear: true,
            ..Default::default()
        });
        setup(service.clone()).configure(TransportMode::Pull, "unused").await;

        let calls = service.calls.lock().unwrap().clone();
        assert_eq!(calls.first().map(String::as_str), Some("clear"));
        assert_eq!(calls.last().map(String::as_str), Some("delete-webhook"));
        assert!(!calls.iter().any(|c| c.starts_with("webhook")));
    }

    #[test]
    fn test_pre_subscriptions_per_device_pattern() {
        let service = Arc::new(FakeService::default());
        let setup = ChannelSetup::new(
            service.clone(),
            service.clone(),
            service,
            PatternSet::from_csv("a*,b*"),
            PatternSet::from_csv("/3303/*,/3304/*"),
        );
        let pre = setup.pre_subscriptions();
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[1].endpoint_name, "b*");
        assert_eq!(pre[1].resource_path, vec!["/3303/*", "/3304/*"]);
    }
}
