//! Federated coordinator binary

use clap::{Parser, Subcommand};
use fedraft::common::{Config, FederationConfig};
use fedraft::FederationServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fedraft-fed")]
#[command(about = "fedraft federated coordinator supervising DB clusters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a federated coordinator
    Serve {
        /// Coordinator ID; derived from the advertise URL when omitted. An
        /// explicit id must appear as `id@url` in the peers list of the
        /// other coordinators.
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long, default_value = "0.0.0.0:9090")]
        bind: String,

        /// URL this coordinator advertises to its peers
        #[arg(long)]
        advertise: Option<String>,

        /// Federated peer URLs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        peers: Vec<String>,
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
        } => {
            let file_config = Config::load().and_then(|c| c.federation);
            let bind_addr = bind.parse()?;
            let advertise_url =
                advertise.unwrap_or_else(|| format!("http://{}", bind_addr));
            let mut fed_config = FederationConfig {
                bind_addr,
                advertise_url,
                peers,
                ..Default::default()
            };
            if let Some(file_conf) = file_config {
                if fed_config.peers.is_empty() {
                    fed_config.peers = file_conf.peers;
                }
                fed_config.election_timeout_min_ms = file_conf.election_timeout_min_ms;
                fed_config.election_timeout_max_ms = file_conf.election_timeout_max_ms;
                fed_config.heartbeat_interval_ms = file_conf.heartbeat_interval_ms;
                fed_config.stale_threshold_ms = file_conf.stale_threshold_ms;
                fed_config.health_sweep_interval_ms = file_conf.health_sweep_interval_ms;
                fed_config.reconcile_interval_ms = file_conf.reconcile_interval_ms;
                fed_config.rpc_timeout_ms = file_conf.rpc_timeout_ms;
            }
            let id =
                id.unwrap_or_else(|| fedraft::cluster::derive_peer_id(&fed_config.advertise_url));
            let server = FederationServer::new(id, fed_config)?;
            server.serve().await?;
        }
    }

    Ok(())
}
