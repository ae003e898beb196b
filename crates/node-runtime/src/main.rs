//! # Quorum-Ledger Node
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (`RUST_LOG`, default `info`)
//! 2. Load configuration (defaults, `QL_CONFIG_FILE`, `QL_*` overrides)
//! 3. Open the ledger store and lock its data directory
//! 4. Start the task engine, pipelines and consensus service
//! 5. Listen for peers over TCP
//!
//! The node runs until Ctrl-C or until a fatal ledger error stops consensus,
//! then drains in-flight work and exits.

use anyhow::{Context, Result};
use node_runtime::{logging, NodeConfig, NodeRuntime};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let config = NodeConfig::load().context("failed to load node configuration")?;
    info!(
        node = %config.network.node_id,
        listen = %config.network.listen_addr,
        peers = config.network.peers.len(),
        "starting Quorum-Ledger node"
    );

    let runtime = NodeRuntime::start_tcp(config).await?;
    let mut stopped = runtime.stopped();

    let fatal = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("received Ctrl-C");
            false
        }
        _ = stopped.wait_for(|stopped| *stopped) => {
            error!("node stopped after a fatal ledger error");
            true
        }
    };

    runtime.shutdown().await;
    if fatal {
        anyhow::bail!("ledger corruption detected, node stopped");
    }
    Ok(())
}
