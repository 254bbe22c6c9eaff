//! Configuration for fedraft components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    pub node_id: String,

    /// Tier this process runs in (db node or federated coordinator)
    pub tier: NodeTier,

    /// DB-node specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeConfig>,

    /// Federated-coordinator specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federation: Option<FederationConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeTier {
    Node,
    Federated,
}

/// DB-node group member configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// URL other peers use to reach this node
    pub advertise_url: String,

    /// Seed peers (other members of this group), as plain URLs or `id@url`
    /// for peers running under an explicit id
    #[serde(default)]
    pub peers: Vec<String>,

    /// Federated coordinator URLs; empty means standalone mode
    #[serde(default)]
    pub federated_servers: Vec<String>,

    /// Lower bound of the randomized election timeout
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_max_ms: u64,

    /// Leader heartbeat interval
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Silence before a peer is considered INACTIVE
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_ms: u64,

    /// Per-RPC timeout for vote and heartbeat delivery
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
}

// Deliberately wide timeouts: stable clusters should not stumble into
// accidental elections on transient hiccups.
fn default_election_timeout_min() -> u64 {
    6_000
}
fn default_election_timeout_max() -> u64 {
    12_000
}
fn default_heartbeat_interval() -> u64 {
    1_500
}
fn default_stale_threshold() -> u64 {
    10_000
}
fn default_rpc_timeout() -> u64 {
    2_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            advertise_url: "http://localhost:8080".to_string(),
            peers: Vec::new(),
            federated_servers: Vec::new(),
            election_timeout_min_ms: default_election_timeout_min(),
            election_timeout_max_ms: default_election_timeout_max(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            stale_threshold_ms: default_stale_threshold(),
            rpc_timeout_ms: default_rpc_timeout(),
        }
    }
}

/// Federated coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// URL other coordinators use to reach this one
    pub advertise_url: String,

    /// Other federated coordinators
    #[serde(default)]
    pub peers: Vec<String>,

    #[serde(default = "default_fed_election_timeout_min")]
    pub election_timeout_min_ms: u64,

    #[serde(default = "default_fed_election_timeout_max")]
    pub election_timeout_max_ms: u64,

    #[serde(default = "default_fed_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Silence before a supervised DB node is considered INACTIVE
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_ms: u64,

    /// Interval of the nested-group health sweep
    #[serde(default = "default_health_sweep_interval")]
    pub health_sweep_interval_ms: u64,

    /// Interval of the DB-leader reconcile loop
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_ms: u64,

    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
}

fn default_fed_election_timeout_min() -> u64 {
    3_000
}
fn default_fed_election_timeout_max() -> u64 {
    5_000
}
fn default_fed_heartbeat_interval() -> u64 {
    1_000
}
fn default_health_sweep_interval() -> u64 {
    5_000
}
fn default_reconcile_interval() -> u64 {
    10_000
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9080".parse().unwrap(),
            advertise_url: "http://localhost:9080".to_string(),
            peers: Vec::new(),
            election_timeout_min_ms: default_fed_election_timeout_min(),
            election_timeout_max_ms: default_fed_election_timeout_max(),
            heartbeat_interval_ms: default_fed_heartbeat_interval(),
            stale_threshold_ms: default_stale_threshold(),
            health_sweep_interval_ms: default_health_sweep_interval(),
            reconcile_interval_ms: default_reconcile_interval(),
            rpc_timeout_ms: default_rpc_timeout(),
        }
    }
}

impl Config {
    /// Load config from `fedraft.toml` (if present) merged with `FEDRAFT_*`
    /// environment variables. CLI arguments override both in the binaries.
    pub fn load() -> Option<Config> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("fedraft").required(false))
            .add_source(config::Environment::with_prefix("FEDRAFT").separator("__"))
            .build()
            .ok()?;
        settings.try_deserialize().ok()
    }
}
