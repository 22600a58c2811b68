//! The publish loop.
//!
//! Multiplexes pair intake with a fixed publish tick. Publishing snapshots
//! the metric registry and takes the pending schema and event queues; a
//! failed push puts them back so the next tick retries. Capture never waits
//! on the collector beyond the pair channel's bounded capacity.

use std::sync::Arc;
use std::time::Duration;

use siege_core::collector::{Collector, ListenerUpdate};
use siege_core::pair::HttpPair;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;

pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(15);

pub struct Publisher<C> {
    aggregator: Aggregator,
    collector: Arc<C>,
    listener_id: String,
    interval: Duration,
}

impl<C: Collector> Publisher<C> {
    pub fn new(
        aggregator: Aggregator,
        collector: Arc<C>,
        listener_id: String,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            collector,
            listener_id,
            interval,
        }
    }

    /// Drain pairs and publish on every tick until shutdown or the pair
    /// channel closes. A final publish flushes whatever is still queued.
    pub async fn run(
        mut self,
        mut pairs: mpsc::Receiver<HttpPair>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_pair = pairs.recv() => match maybe_pair {
                    Some(pair) => self.aggregator.ingest(&pair),
                    None => break,
                },
                _ = ticker.tick() => self.publish().await,
                _ = shutdown.changed() => break,
            }
        }

        self.publish().await;
    }

    async fn publish(&mut self) {
        let (schemas, events) = self.aggregator.take_pending();
        let update = ListenerUpdate {
            listener_id: self.listener_id.clone(),
            schemas,
            metrics: self.aggregator.metrics_text(),
            events,
        };

        match self.collector.update(&update).await {
            Ok(()) => {
                if !update.schemas.is_empty() {
                    debug!(schemas = update.schemas.len(), "published update");
                }
            }
            Err(e) => {
                warn!(error = %e, "publish failed, retrying next tick");
                self.aggregator.restore_pending(update.schemas, update.events);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use siege_core::error::CollectorError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCollector {
        updates: Mutex<Vec<ListenerUpdate>>,
        fail_next: AtomicUsize,
    }

    #[async_trait]
    impl Collector for FakeCollector {
        async fn startup(&self) -> Result<String, CollectorError> {
            Ok("lst-test".to_string())
        }

        async fn shutdown(&self, _listener_id: &str) -> Result<(), CollectorError> {
            Ok(())
        }

        async fn update(&self, update: &ListenerUpdate) -> Result<(), CollectorError> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(CollectorError::Status(500));
            }
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    fn widget_pair() -> HttpPair {
        HttpPair {
            request: b"GET /widget HTTP/1.1\r\n\r\n".to_vec(),
            response: b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec(),
            duration: Duration::from_millis(5),
        }
    }

    fn publisher(collector: Arc<FakeCollector>) -> Publisher<FakeCollector> {
        Publisher::new(
            Aggregator::new().unwrap(),
            collector,
            "lst-test".to_string(),
            DEFAULT_PUBLISH_INTERVAL,
        )
    }

    #[tokio::test]
    async fn test_publish_sends_and_clears() {
        let collector = Arc::new(FakeCollector::default());
        let mut publisher = publisher(collector.clone());

        publisher.aggregator.ingest(&widget_pair());
        publisher.publish().await;

        let updates = collector.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].schemas.len(), 1);
        assert_eq!(updates[0].listener_id, "lst-test");
        assert!(updates[0]
            .metrics
            .contains("siege_listener_http_response_total"));
        drop(updates);

        assert_eq!(publisher.aggregator.pending_schemas(), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_retries_with_same_schemas() {
        let collector = Arc::new(FakeCollector::default());
        collector.fail_next.store(1, Ordering::SeqCst);
        let mut publisher = publisher(collector.clone());

        publisher.aggregator.ingest(&widget_pair());
        publisher.publish().await;
        assert_eq!(publisher.aggregator.pending_schemas(), 1);
        assert!(collector.updates.lock().unwrap().is_empty());

        publisher.publish().await;
        assert_eq!(publisher.aggregator.pending_schemas(), 0);
        let updates = collector.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].schemas.len(), 1);
    }

    #[tokio::test]
    async fn test_run_flushes_on_channel_close() {
        let collector = Arc::new(FakeCollector::default());
        let publisher = publisher(collector.clone());

        let (tx, rx) = mpsc::channel(32);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(widget_pair()).await.unwrap();
        drop(tx);
        publisher.run(rx, shutdown_rx).await;

        let updates = collector.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].schemas.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let collector = Arc::new(FakeCollector::default());
        let publisher = publisher(collector.clone());

        let (_tx, rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(publisher.run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // The final flush still pushed a (schema-less) metrics update.
        assert_eq!(collector.updates.lock().unwrap().len(), 1);
    }
}
