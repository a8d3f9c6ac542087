//! # Server Binary Entry Point
//!
//! Runs one node of the election cluster.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- node-01
//! cargo run --bin server -- node-02 --config config/cluster.toml
//! ```
//!
//! The node will:
//! 1. Load the peer table (built-in localhost table when no config is given)
//! 2. Bind the port of its own registry entry
//! 3. Wait until every peer answers a ping
//! 4. Run the initial election and follow or lead from then on
//! 5. Shut down cleanly on Ctrl-C

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::sync::Arc;

use bully_election::common::config::{load_config, ClusterConfig};
use bully_election::server::messenger::HttpTransport;
use bully_election::server::{PeerRegistry, ServerMiddleware};

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Id of this node in the peer table (e.g. node-01)
    node_id: String,

    /// Path to the cluster configuration file (TOML format)
    ///
    /// Example: config/cluster.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Host to bind; the port comes from this node's peer entry
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// INFO by default, overridable through `RUST_LOG`.
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let config: ClusterConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ClusterConfig::default(),
    };

    // Unknown node ids are fatal before anything is served
    let registry = PeerRegistry::load(&args.node_id, &config.peers)?;
    let port = config
        .peers
        .iter()
        .find(|p| p.id == args.node_id)
        .map(|p| p.listen_port())
        .transpose()?
        .context("node missing from peer table")?;

    let listener = tokio::net::TcpListener::bind((args.bind.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.bind, port))?;

    let node = ServerMiddleware::new(registry, config.election, Arc::new(HttpTransport::new()));

    let signal_node = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Received interrupt");
        }
        signal_node.shutdown();
    });

    node.run(listener).await?;

    Ok(())
}
