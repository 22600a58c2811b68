use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use siege_capture::PacketSource;
use siege_collector::CollectorClient;
use siege_core::collector::Collector;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod supervisor;

#[derive(Parser)]
#[command(name = "siege-listener", about = "Passive API traffic listener", version)]
struct Cli {
    /// Bearer token for the collector
    #[arg(long, env = "SIEGE_APIKEY", hide_env_values = true)]
    apikey: String,

    /// Device to capture on
    #[arg(long, env = "SIEGE_DEVICE", default_value = "lo")]
    device: String,

    /// BPF capture filter
    #[arg(long, env = "SIEGE_FILTER", default_value = "tcp and port 80")]
    filter: String,

    /// Collector base URL
    #[arg(long, env = "SIEGE_SERVER", default_value = "https://dashboard.siegeai.com")]
    server: String,

    /// Log level (debug, info, warn, error)
    #[arg(long, env = "SIEGE_LOG", default_value = "info")]
    log: String,

    /// Read packets from a pcap file instead of a live device
    #[arg(short = 'r', long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log)
        .map_err(|e| anyhow::anyhow!("invalid SIEGE_LOG {:?}: {e}", cli.log))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source = match &cli.file {
        Some(path) => {
            info!(file = %path.display(), "reading from pcap dump");
            PacketSource::offline(path, &cli.filter)
        }
        None => {
            info!(device = %cli.device, filter = %cli.filter, "starting live capture");
            PacketSource::live(&cli.device, &cli.filter)
        }
    }
    .map_err(|e| anyhow::anyhow!("could not init packet source: {e}"))?;

    let client = Arc::new(
        CollectorClient::new(&cli.apikey, &cli.server)
            .map_err(|e| anyhow::anyhow!("could not init collector client: {e}"))?,
    );

    // Registration is best-effort: capture starts either way, under a
    // placeholder id if the collector is unreachable.
    let listener_id = match client.startup().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "startup registration failed, continuing unregistered");
            "unregistered".to_string()
        }
    };
    info!(listener_id = %listener_id, "listening");

    supervisor::run(source, client.clone(), listener_id.clone()).await?;

    if let Err(e) = client.shutdown(&listener_id).await {
        error!(error = %e, "shutdown deregistration failed");
    }

    Ok(())
}
