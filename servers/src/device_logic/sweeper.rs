use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use lib_common::devices::CorrelationStore;

/// Drops correlation entries older than `ttl`, checking every `ttl / 2`
/// (at least once a second), until `shutdown` fires.
pub async fn run(store: Arc<CorrelationStore>, ttl: Duration, mut shutdown: broadcast::Receiver<()>) {
    let period = (ttl / 2).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    log::info!("Correlation sweeper started (ttl {:?}).", ttl);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let evicted = store.evict_older_than(ttl);
                if evicted > 0 {
                    log::warn!("Dropped {} unanswered device request(s) older than {:?}", evicted, ttl);
                }
            }
        }
    }
    log::info!("Correlation sweeper stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::devices::CorrelationEntry;

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let store = Arc::new(CorrelationStore::new());
        store.insert(CorrelationEntry {
            correlation_id: "1".to_string(),
            device_id: "dev1".to_string(),
            path: "/3303/0/5700".to_string(),
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(store.clone(), Duration::from_secs(3600), rx));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(store.len(), 1);
    }
}
