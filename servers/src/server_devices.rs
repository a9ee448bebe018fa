//! # Device Telemetry Server
//!
//! Connects to the device management service, keeps subscriptions for the
//! configured devices and resources, and stores every value that comes back.
//!
//! ## Tasks:
//! - **Channel setup**: subscriptions, then a webhook (push) or the long-poll
//!   loop (pull).
//! - **Resource poller**: periodic reads of every matching resource, started
//!   once channel setup is done.
//! - **Event forwarder**: routed values into PostgreSQL.
//! - **HTTP server**: webhook target, device writes/executes and read
//!   endpoints for stored data.
//! - **Correlation sweeper**: only when a request TTL is configured.
//!
//! All tasks stop on Ctrl-C or SIGTERM.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

mod device_logic;
use device_logic::{config, http, ingestion::Ingestion, sweeper};

use lib_common::connections::PgEventSink;
use lib_common::core::{Scheduler, TokioScheduler};
use lib_common::devices::{
    forward_events, ChannelSetup, CorrelationStore, EventSink, NotificationRouter, RequestDispatcher, TransportMode,
};
use lib_common::ingestors::{LongPollLoop, ResourcePoller};
use lib_common::loggers;
use lib_common::retrieve::PelionClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Use a .env file when running locally
    let _ = dotenvy::dotenv();

    let settings = config::load_config()?;
    let log_path = loggers::setup_logging(&settings.log_dir, &settings.log_level, "server_devices")?;
    log::info!("Logging to {}", log_path.display());
    log::info!("API_HOST={}", settings.api_host);
    log::info!("DEVICE_ID={}", settings.device_patterns.patterns().join(","));
    log::info!("RESOURCE={}", settings.resource_patterns.patterns().join(","));
    log::info!("LONG_POLLING_ENABLED={}", settings.transport == TransportMode::Pull);

    let (shutdown_tx, _) = broadcast::channel(1);

    // Remote service, persistence and the correlation core
    let client = Arc::new(PelionClient::new(
        &settings.api_host,
        &settings.api_key,
        settings.long_poll_timeout,
    )?);
    let records = Arc::new(PgEventSink::connect(&settings.database_url, settings.store_data, settings.db_use_ssl)?);
    if let Err(e) = records.ensure_schema().await {
        log::error!("Failed to prepare database schema: {}", e);
    }
    let sink: Arc<dyn EventSink> = records.clone();

    let store = Arc::new(CorrelationStore::new());
    let dispatcher = Arc::new(RequestDispatcher::new(client.clone(), store.clone()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let router = Arc::new(NotificationRouter::new(store.clone(), events_tx));
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);

    let forwarder_handle = tokio::spawn(forward_events(sink.clone(), events_rx, shutdown_tx.subscribe()));

    // Subscriptions first; the poller and the long-poll loop only start once
    // they are in place.
    let ingestion = Ingestion {
        setup: ChannelSetup::new(
            client.clone(),
            client.clone(),
            client.clone(),
            settings.device_patterns.clone(),
            settings.resource_patterns.clone(),
        ),
        transport: settings.transport,
        webhook_url: settings.webhook_url.clone(),
        long_poll: LongPollLoop::new(client.clone(), router.clone(), scheduler.clone(), &settings.long_poll),
        poller: Arc::new(ResourcePoller::new(
            client.clone(),
            client.clone(),
            dispatcher.clone(),
            sink.clone(),
            scheduler.clone(),
            settings.poller.clone(),
        )),
    };
    let ingestion_handle = tokio::spawn(ingestion.run(shutdown_tx.subscribe(), shutdown_tx.subscribe()));

    let sweeper_handle = settings
        .correlation_ttl
        .map(|ttl| tokio::spawn(sweeper::run(store.clone(), ttl, shutdown_tx.subscribe())));

    // HTTP boundary
    let app = http::build_router(
        http::AppState {
            router: router.clone(),
            dispatcher: dispatcher.clone(),
            records: records.clone(),
        },
        settings.transport,
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);
    let server_handle = {
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                log::error!("HTTP server failed: {}", e);
            }
        })
    };

    wait_for_signal().await;

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::join!(forwarder_handle, ingestion_handle, server_handle);
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    log::info!("Shutdown complete.");
    Ok(())
}

async fn wait_for_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}
