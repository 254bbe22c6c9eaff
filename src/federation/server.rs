//! Federated coordinator server

use std::sync::Arc;

use crate::cluster::{
    spawn_tick_loop, ElectionNode, ElectionTiming, HttpTransport, PeerRegistry,
};
use crate::common::{Clock, FederationConfig, Result, SystemClock};

use super::http::{create_router, FederationState};
use super::supervisor::{
    spawn_supervision_loops, FederationSupervisor, HttpPromoteClient, SupervisorObserver,
};

const TICK_INTERVAL_MS: u64 = 200;

pub struct FederationServer {
    config: FederationConfig,
    node_id: String,
    supervisor: Arc<FederationSupervisor>,
}

impl FederationServer {
    pub fn new(node_id: String, config: FederationConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(PeerRegistry::new(
            node_id.clone(),
            config.advertise_url.clone(),
            config.stale_threshold_ms,
            clock.clone(),
        ));
        registry.seed(&config.peers);

        let transport = Arc::new(HttpTransport::new(
            "/federated/raft",
            config.rpc_timeout_ms,
        ));
        let timing = ElectionTiming {
            election_timeout_min_ms: config.election_timeout_min_ms,
            election_timeout_max_ms: config.election_timeout_max_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
        };
        let election = Arc::new(ElectionNode::new(registry, transport, clock.clone(), timing));
        election.set_observer(Arc::new(SupervisorObserver));

        let promoter = Arc::new(HttpPromoteClient::new(config.rpc_timeout_ms)?);
        let supervisor = FederationSupervisor::new(
            election,
            clock,
            config.stale_threshold_ms,
            promoter,
        );

        Ok(Self {
            config,
            node_id,
            supervisor,
        })
    }

    pub fn supervisor(&self) -> &Arc<FederationSupervisor> {
        &self.supervisor
    }

    pub fn election(&self) -> &Arc<ElectionNode> {
        self.supervisor.election()
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting federated coordinator: {}", self.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Advertised as: {}", self.config.advertise_url);
        tracing::info!(
            "  Federation size: {}",
            self.supervisor.election().registry().len()
        );

        let _tick_handle = spawn_tick_loop(self.supervisor.election().clone(), TICK_INTERVAL_MS);
        let (_sweep_handle, _reconcile_handle) = spawn_supervision_loops(
            self.supervisor.clone(),
            self.config.health_sweep_interval_ms,
            self.config.reconcile_interval_ms,
        );

        let state = FederationState::new(self.supervisor.clone());
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            "✓ Federated coordinator ready ({})",
            self.supervisor.election().snapshot().role
        );

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
