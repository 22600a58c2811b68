//! Task wiring and shutdown.
//!
//! Three long-running tasks own disjoint state and talk over bounded
//! channels:
//!
//! - *listen* owns the packet source and the flow assembler,
//! - *reassemble* owns every framer buffer,
//! - *publish* owns the aggregator and the metric registry.
//!
//! A watch channel broadcasts shutdown; each task returns at its next wait.
//! In-flight pairs may be dropped on the way out, which is fine because
//! publishing is best-effort.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use siege_aggregate::{Aggregator, Publisher};
use siege_capture::{decode_tcp, FlowAssembler, HttpFramer, PacketSource, StreamEvent};
use siege_core::collector::Collector;
use siege_core::pair::HttpPair;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the listen → reassemble stream event channel. When it fills,
/// the listen task blocks and packets accumulate in the kernel capture
/// buffer.
const STREAM_CHANNEL_CAPACITY: usize = 128;

/// Capacity of the reassemble → publish pair channel.
const PAIR_CHANNEL_CAPACITY: usize = 32;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
const FLOW_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Run the pipeline until SIGINT/SIGTERM or end of capture.
pub async fn run<C: Collector + 'static>(
    source: PacketSource,
    collector: Arc<C>,
    listener_id: String,
) -> anyhow::Result<()> {
    let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let (pair_tx, pair_rx) = mpsc::channel(PAIR_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let aggregator = Aggregator::new().map_err(|e| anyhow::anyhow!("metric registry: {e}"))?;
    let publisher = Publisher::new(
        aggregator,
        collector,
        listener_id,
        siege_aggregate::DEFAULT_PUBLISH_INTERVAL,
    );

    let listen = tokio::spawn(listen_task(source, stream_tx, shutdown_rx.clone()));
    let reassemble = tokio::spawn(reassemble_task(stream_rx, pair_tx, shutdown_rx.clone()));
    let publish = tokio::spawn(publisher.run(pair_rx, shutdown_rx));

    tokio::select! {
        _ = wait_for_signal() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        _ = shutdown_tx.closed() => {
            // All receivers gone: the pipeline drained on its own (end of an
            // offline capture).
            debug!("pipeline finished");
        }
    }

    listen.await?;
    reassemble.await?;
    publish.await?;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "could not install SIGTERM handler");
            let _ = ctrl_c.await;
        }
    }
}

/// Drain packets into the flow assembler; age out idle flows on a timer.
async fn listen_task(
    mut source: PacketSource,
    stream_tx: mpsc::Sender<StreamEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut assembler = FlowAssembler::new();
    let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
    maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_packet = source.recv() => match maybe_packet {
                Some(packet) => {
                    let Some(segment) = decode_tcp(&packet.data, packet.ts) else {
                        continue;
                    };
                    for event in assembler.feed(segment) {
                        if stream_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                None => {
                    debug!("packet source finished, flushing flows");
                    for event in assembler.close_all() {
                        if stream_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    return;
                }
            },
            _ = maintenance.tick() => {
                let cutoff = SystemTime::now() - FLOW_IDLE_TIMEOUT;
                for event in assembler.flush_older_than(cutoff) {
                    if stream_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

/// Drain stream events through the framer; forward completed pairs.
async fn reassemble_task(
    mut stream_rx: mpsc::Receiver<StreamEvent>,
    pair_tx: mpsc::Sender<HttpPair>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut framer = HttpFramer::new();

    loop {
        tokio::select! {
            maybe_event = stream_rx.recv() => match maybe_event {
                Some(event) => {
                    for pair in framer.handle(event) {
                        if pair_tx.send(pair).await.is_err() {
                            return;
                        }
                    }
                }
                None => return,
            },
            _ = shutdown.changed() => return,
        }
    }
}
