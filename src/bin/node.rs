//! DB group node binary

use clap::{Parser, Subcommand};
use fedraft::common::{Config, NodeConfig};
use fedraft::GroupServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fedraft-node")]
#[command(about = "fedraft DB group node with leader election")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a group node
    Serve {
        /// Node ID; derived from the advertise URL when omitted. An explicit
        /// id must appear as `id@url` in the peers list of the other members.
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long, default_value = "0.0.0.0:7070")]
        bind: String,

        /// URL this node advertises to its peers
        #[arg(long)]
        advertise: Option<String>,

        /// Group peer URLs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        peers: Vec<String>,

        /// Federated coordinator URLs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        federated: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            advertise,
            peers,
            federated,
        } => {
            // File config first, CLI arguments take priority
            let file_config = Config::load().and_then(|c| c.node);
            let bind_addr = bind.parse()?;
            let advertise_url =
                advertise.unwrap_or_else(|| format!("http://{}", bind_addr));
            let mut node_config = NodeConfig {
                bind_addr,
                advertise_url,
                peers,
                federated_servers: federated,
                ..Default::default()
            };
            if let Some(file_conf) = file_config {
                if node_config.peers.is_empty() {
                    node_config.peers = file_conf.peers;
                }
                if node_config.federated_servers.is_empty() {
                    node_config.federated_servers = file_conf.federated_servers;
                }
                node_config.election_timeout_min_ms = file_conf.election_timeout_min_ms;
                node_config.election_timeout_max_ms = file_conf.election_timeout_max_ms;
                node_config.heartbeat_interval_ms = file_conf.heartbeat_interval_ms;
                node_config.stale_threshold_ms = file_conf.stale_threshold_ms;
                node_config.rpc_timeout_ms = file_conf.rpc_timeout_ms;
            }
            let id =
                id.unwrap_or_else(|| fedraft::cluster::derive_peer_id(&node_config.advertise_url));
            let server = GroupServer::new(id, node_config);
            server.serve().await?;
        }
    }

    Ok(())
}
