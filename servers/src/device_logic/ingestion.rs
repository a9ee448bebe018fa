//! # Ingestion Start-up
//!
//! Channel setup resets every subscription, so nothing reads device values
//! until it has finished. Only then do the resource poller and, in pull mode,
//! the long-poll loop start.

use std::sync::Arc;
use tokio::sync::broadcast;

use lib_common::devices::{ChannelSetup, TransportMode};
use lib_common::ingestors::{LongPollLoop, ResourcePoller};

/// Everything that feeds values into the router.
pub struct Ingestion {
    pub setup: ChannelSetup,
    pub transport: TransportMode,
    pub webhook_url: String,
    pub long_poll: LongPollLoop,
    pub poller: Arc<ResourcePoller>,
}

impl Ingestion {
    /// Configures the channel, then runs the poller (and the long-poll loop in
    /// pull mode) until shutdown.
    ///
    /// Both receivers must be subscribed before this is spawned so a shutdown
    /// sent during setup is still seen.
    pub async fn run(self, poller_shutdown: broadcast::Receiver<()>, long_poll_shutdown: broadcast::Receiver<()>) {
        self.setup.configure(self.transport, &self.webhook_url).await;

        log::info!("Notification channel ready, starting resource poller.");
        let poller_handle = tokio::spawn(self.poller.run(poller_shutdown));

        if self.transport == TransportMode::Pull {
            self.long_poll.run(long_poll_shutdown).await;
        }

        if let Err(e) = poller_handle.await {
            log::error!("Resource poller task failed: {}", e);
        }
    }
}
