//! # Resource Poller
//!
//! Subscriptions tell us when a value changes, not what it is right now. The
//! poller periodically walks every matching device and issues a read for every
//! matching resource, so each tracked resource has a recent value even when no
//! notification was ever pushed for it.
//!
//! ## Per cycle:
//! 1. List the device directory.
//! 2. Keep devices matching the device patterns and record each one.
//! 3. For registered devices, list and record their resources.
//! 4. Keep resources matching the resource patterns.
//! 5. Dispatch one read per resource, pausing `request_pacing` after each.
//!    The service's per-device request queue holds about twenty entries and
//!    drops overflow silently, so the pause is not optional.
//!
//! Devices are processed concurrently; resources within a device strictly in
//! sequence. The next cycle starts `cycle_interval` after the previous one
//! started, whether or not its reads have all gone out.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;

use crate::core::scheduler::Scheduler;
use crate::devices::error::DeviceError;
use crate::devices::model::{RegisteredDevice, RequestMethod};
use crate::devices::remote::{DeviceDirectory, DeviceResources};
use crate::devices::requests::RequestDispatcher;
use crate::devices::sink::EventSink;
use crate::devices::wildcard::PatternSet;

/// Filters and timing of the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Devices of interest.
    pub device_patterns: PatternSet,
    /// Resources of interest.
    pub resource_patterns: PatternSet,
    /// Time between cycle starts.
    pub cycle_interval: Duration,
    /// Pause after each read request on a device.
    pub request_pacing: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            device_patterns: PatternSet::from_csv("*"),
            resource_patterns: PatternSet::from_csv("*"),
            cycle_interval: Duration::from_secs(5 * 60),
            request_pacing: Duration::from_millis(500),
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices that matched the device patterns.
    pub devices_matched: usize,
    /// Read requests the service accepted.
    pub reads_accepted: usize,
    /// Read requests the service rejected.
    pub reads_rejected: usize,
}

/// # Resource Poller
pub struct ResourcePoller {
    directory: Arc<dyn DeviceDirectory>,
    resources: Arc<dyn DeviceResources>,
    dispatcher: Arc<RequestDispatcher>,
    sink: Arc<dyn EventSink>,
    scheduler: Arc<dyn Scheduler>,
    config: PollerConfig,
}

impl ResourcePoller {
    /// Creates a poller.
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        resources: Arc<dyn DeviceResources>,
        dispatcher: Arc<RequestDispatcher>,
        sink: Arc<dyn EventSink>,
        scheduler: Arc<dyn Scheduler>,
        config: PollerConfig,
    ) -> Self {
        Self {
            directory,
            resources,
            dispatcher,
            sink,
            scheduler,
            config,
        }
    }

    /// # Run Cycle
    ///
    /// Performs one full pass and waits for every device's reads to go out.
    ///
    /// # Errors
    /// Only a failed directory listing fails the cycle; per-device failures
    /// are logged and skipped.
    pub async fn run_cycle(&self) -> Result<CycleReport, DeviceError> {
        log::info!("Getting latest resource values");
        let devices = self.directory.list_registered_devices().await?;

        let matched: Vec<&RegisteredDevice> = devices
            .iter()
            .filter(|d| self.config.device_patterns.matches(&d.id))
            .collect();

        let per_device = join_all(matched.iter().map(|device| self.poll_device(device))).await;

        let report = per_device.into_iter().fold(
            CycleReport {
                devices_matched: matched.len(),
                ..Default::default()
            },
            |mut acc, (accepted, rejected)| {
                acc.reads_accepted += accepted;
                acc.reads_rejected += rejected;
                acc
            },
        );
        log::info!(
            "Resource values requested on {} device(s): {} accepted, {} rejected",
            report.devices_matched,
            report.reads_accepted,
            report.reads_rejected
        );
        Ok(report)
    }

    /// Records `device` and reads its matching resources. Returns
    /// `(accepted, rejected)` read counts.
    async fn poll_device(&self, device: &RegisteredDevice) -> (usize, usize) {
        log::info!(
            "Update db for device: {} {}",
            device.id,
            device.name.as_deref().unwrap_or("")
        );
        self.sink.upsert_device_directory(device).await;
        if !device.is_registered() {
            return (0, 0);
        }

        log::info!("Looking for resources on {}", device.id);
        let resources = match self.resources.list_resources(&device.id).await {
            Ok(resources) => resources,
            Err(e) => {
                log::warn!("Failed to list resources on {}: {}", device.id, e);
                return (0, 0);
            }
        };

        match serde_json::to_string(&resources) {
            Ok(json) => self.sink.upsert_device_resources(&device.id, &json).await,
            Err(e) => log::warn!("Failed to encode resources of {}: {}", device.id, e),
        }

        let mut accepted = 0;
        let mut rejected = 0;
        for resource in resources
            .iter()
            .filter(|r| self.config.resource_patterns.matches(&r.uri))
        {
            log::info!("Requesting resource {} {}", device.id, resource.uri);
            match self
                .dispatcher
                .dispatch(&device.id, &resource.uri, None, RequestMethod::Read)
                .await
            {
                Ok(_) => accepted += 1,
                Err(_) => rejected += 1,
            }
            self.scheduler.sleep(self.config.request_pacing).await;
        }
        (accepted, rejected)
    }

    /// # Main Execution Loop
    ///
    /// Starts a cycle, then waits `cycle_interval` before the next one. Cycles
    /// run as their own tasks so a long pacing run never delays the schedule.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        log::info!("Resource poller started.");
        loop {
            let poller = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = poller.run_cycle().await {
                    log::error!("Resource poll cycle failed: {}", e);
                }
            });

            log::info!(
                "Going to sleep for {} second(s) before the next poll",
                self.config.cycle_interval.as_secs()
            );
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.scheduler.sleep(self.config.cycle_interval) => {}
            }
        }
        log::info!("Resource poller stopped.");
    }
}
