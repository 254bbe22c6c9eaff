//! DB group node server
//!
//! Wires the registry, election machine and HTTP surface together, then
//! runs until shutdown. When federated coordinators are configured, a
//! background sync loop registers this node with them and streams liveness
//! reports upward, adopting the coordinator's DB-leader view when this node
//! is itself leaderless.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sysinfo::{Disks, System};

use crate::common::{Clock, NodeConfig, PeerReport, Result, SystemClock};

use super::election::{spawn_tick_loop, ElectionNode, ElectionTiming};
use super::http::{create_router, ClusterState};
use super::registry::PeerRegistry;
use super::transport::HttpTransport;

const TICK_INTERVAL_MS: u64 = 200;

pub struct GroupServer {
    config: NodeConfig,
    node_id: String,
    election: Arc<ElectionNode>,
}

impl GroupServer {
    pub fn new(node_id: String, config: NodeConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(PeerRegistry::new(
            node_id.clone(),
            config.advertise_url.clone(),
            config.stale_threshold_ms,
            clock.clone(),
        ));
        registry.seed(&config.peers);

        let transport = Arc::new(HttpTransport::new("/raft", config.rpc_timeout_ms));
        let timing = ElectionTiming {
            election_timeout_min_ms: config.election_timeout_min_ms,
            election_timeout_max_ms: config.election_timeout_max_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
        };
        let election = Arc::new(ElectionNode::new(registry, transport, clock, timing));

        Self {
            config,
            node_id,
            election,
        }
    }

    pub fn election(&self) -> &Arc<ElectionNode> {
        &self.election
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting group node: {}", self.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Advertised as: {}", self.config.advertise_url);
        tracing::info!("  Group size: {}", self.election.registry().len());

        let _tick_handle = spawn_tick_loop(self.election.clone(), TICK_INTERVAL_MS);

        if !self.config.federated_servers.is_empty() {
            tracing::info!(
                "  Reporting to {} federated server(s)",
                self.config.federated_servers.len()
            );
            let _sync_handle = spawn_federation_sync(
                self.election.clone(),
                self.config.federated_servers.clone(),
                self.config.advertise_url.clone(),
                self.config.heartbeat_interval_ms,
                self.config.rpc_timeout_ms,
            );
        }

        let state = ClusterState::new(self.election.clone());
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Group node ready ({})", self.election.snapshot().role);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
        return;
    }
    tracing::info!("shutdown signal received");
}

/// Samples process-host gauges for the outgoing liveness report.
struct GaugeSampler {
    system: System,
}

impl GaugeSampler {
    fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn sample(&mut self, node_id: &str, latency_ms: u64, now_ms: u64) -> PeerReport {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();
        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_free) = disks
            .iter()
            .fold((0u64, 0u64), |(total, free), d| {
                (total + d.total_space(), free + d.available_space())
            });
        PeerReport {
            peer_id: node_id.to_string(),
            cpu_usage: f64::from(self.system.global_cpu_usage()),
            ram_used: self.system.used_memory(),
            ram_total: self.system.total_memory(),
            disk_used: disk_total.saturating_sub(disk_free),
            disk_total,
            latency_ms,
            timestamp: now_ms,
        }
    }
}

/// Register with the federated coordinators, then push a liveness report
/// upward every heartbeat interval. Coordinator responses carry the
/// federated view of the DB leader; a leaderless follower adopts it so
/// rejections can still redirect callers somewhere useful.
fn spawn_federation_sync(
    election: Arc<ElectionNode>,
    federated_servers: Vec<String>,
    advertise_url: String,
    interval_ms: u64,
    rpc_timeout_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(rpc_timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("federation sync disabled, client build failed: {}", e);
                return;
            }
        };
        let clock = SystemClock;
        let node_id = election.self_id().to_string();
        let mut sampler = GaugeSampler::new();
        let mut registered: Vec<bool> = vec![false; federated_servers.len()];
        let mut latency_ms: u64 = 0;

        loop {
            for (i, fed) in federated_servers.iter().enumerate() {
                if !registered[i] {
                    let body = json!({ "id": node_id, "url": advertise_url });
                    match client
                        .post(format!("{}/federated/register", fed))
                        .json(&body)
                        .send()
                        .await
                    {
                        Ok(resp) if resp.status().is_success() => {
                            tracing::info!(federated = %fed, "registered with federated server");
                            registered[i] = true;
                        }
                        Ok(resp) => {
                            tracing::debug!(federated = %fed, status = %resp.status(), "federated registration refused");
                        }
                        Err(e) => {
                            tracing::debug!(federated = %fed, error = %e, "federated registration failed");
                        }
                    }
                    continue;
                }

                let report = sampler.sample(&node_id, latency_ms, clock.now_ms());
                let started = std::time::Instant::now();
                match client
                    .post(format!("{}/federated/heartbeat", fed))
                    .json(&report)
                    .send()
                    .await
                {
                    Ok(resp) => {
                        latency_ms = started.elapsed().as_millis() as u64;
                        if resp.status() == reqwest::StatusCode::NOT_FOUND {
                            // Coordinator restarted and lost us; re-register.
                            registered[i] = false;
                            continue;
                        }
                        if let Ok(body) = resp.json::<serde_json::Value>().await {
                            adopt_leader_view(&election, &body);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(federated = %fed, error = %e, "federated heartbeat failed");
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    })
}

/// Mark the coordinator-reported DB leader in the local registry when this
/// node has no leader view of its own. Never overrides an elected local
/// leader.
fn adopt_leader_view(election: &ElectionNode, body: &serde_json::Value) {
    let Some(leader_id) = body.get("dbLeaderId").and_then(|v| v.as_str()) else {
        return;
    };
    if election.is_leader() || election.leader_id().is_some() {
        return;
    }
    if election.registry().contains(leader_id) {
        tracing::debug!(leader = leader_id, "adopting federated DB-leader view");
        election.adopt_leader(leader_id);
    }
}
