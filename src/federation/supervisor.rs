//! Federation supervisor
//!
//! Runs next to the federated-tier election and owns the nested views of
//! the managed clusters: the DB-node group and the memory-node group. The
//! supervisor never replicates document data; it watches liveness reports,
//! decides who the DB leader should be, and tells the chosen node via its
//! promote endpoint.
//!
//! Assignment decisions are made only while this coordinator holds the
//! federated leadership. A degraded cluster with no active node stays
//! leaderless; a leader is never fabricated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cluster::{ElectionNode, MetricsSnapshot, PeerStatus, RoleObserver};
use crate::common::{Clock, Error, PeerReport, Result};

/// Delivery seam for leadership assignment, swappable in tests.
#[async_trait]
pub trait PromoteClient: Send + Sync + 'static {
    async fn promote(&self, url: &str) -> Result<()>;
}

pub struct HttpPromoteClient {
    client: reqwest::Client,
}

impl HttpPromoteClient {
    pub fn new(rpc_timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(rpc_timeout_ms))
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PromoteClient for HttpPromoteClient {
    async fn promote(&self, url: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/cluster/promote", url))
            .json(&json!({}))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(format!(
                "promote refused with status {}",
                resp.status()
            )))
        }
    }
}

/// A node in one of the nested (supervised) groups.
#[derive(Debug, Clone)]
struct ManagedNode {
    id: String,
    url: String,
    last_seen_ms: Option<u64>,
    metrics: MetricsSnapshot,
    stopped: bool,
}

/// Serialized per-node view in the federated status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNodeView {
    pub id: String,
    pub url: String,
    pub status: PeerStatus,
    pub metrics: MetricsSnapshot,
    pub last_seen: Option<u64>,
}

/// One nested group: its members plus the currently assigned leader.
#[derive(Default)]
struct Directory {
    nodes: HashMap<String, ManagedNode>,
    leader_id: Option<String>,
}

/// Answer returned to a reporting node, carrying the federated view of its
/// group leader so the node can adopt it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub status: &'static str,
    pub db_leader_id: Option<String>,
    pub db_leader_url: Option<String>,
}

pub struct FederationSupervisor {
    election: Arc<ElectionNode>,
    db: Mutex<Directory>,
    memory: Mutex<Directory>,
    clock: Arc<dyn Clock>,
    stale_threshold_ms: u64,
    promoter: Arc<dyn PromoteClient>,
}

impl FederationSupervisor {
    pub fn new(
        election: Arc<ElectionNode>,
        clock: Arc<dyn Clock>,
        stale_threshold_ms: u64,
        promoter: Arc<dyn PromoteClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            election,
            db: Mutex::new(Directory::default()),
            memory: Mutex::new(Directory::default()),
            clock,
            stale_threshold_ms,
            promoter,
        })
    }

    pub fn election(&self) -> &Arc<ElectionNode> {
        &self.election
    }

    pub fn is_federated_leader(&self) -> bool {
        self.election.is_leader()
    }

    /// Register (or refresh) a DB node. Registration is liveness ingestion,
    /// not an admin command, so any coordinator accepts it.
    pub fn register_node(&self, id: &str, url: &str) {
        let now = self.clock.now_ms();
        let mut db = self.db.lock().unwrap();
        let entry = db.nodes.entry(id.to_string()).or_insert_with(|| ManagedNode {
            id: id.to_string(),
            url: url.to_string(),
            last_seen_ms: None,
            metrics: MetricsSnapshot::default(),
            stopped: false,
        });
        entry.url = url.to_string();
        entry.last_seen_ms = Some(now);
        entry.stopped = false;
        tracing::info!(node = id, url, "DB node registered");
    }

    /// Ingest a liveness report from a DB node. Unknown reporters are
    /// refused without touching any state.
    pub async fn heartbeat(&self, report: &PeerReport) -> Result<HeartbeatAck> {
        {
            let mut db = self.db.lock().unwrap();
            let Some(entry) = db.nodes.get_mut(&report.peer_id) else {
                return Err(Error::UnknownPeer(report.peer_id.clone()));
            };
            entry.last_seen_ms = Some(self.clock.now_ms());
            entry.metrics = MetricsSnapshot::from_report(report);
        }
        // A report can revive the only live node of a leaderless group.
        if self.is_federated_leader() && self.db_leader().is_none() {
            self.elect_db_leader().await;
        }
        let (db_leader_id, db_leader_url) = self.db_leader_view();
        Ok(HeartbeatAck {
            status: "ok",
            db_leader_id,
            db_leader_url,
        })
    }

    pub fn register_memory_node(&self, id: &str, url: &str) {
        let now = self.clock.now_ms();
        let mut memory = self.memory.lock().unwrap();
        let entry = memory
            .nodes
            .entry(id.to_string())
            .or_insert_with(|| ManagedNode {
                id: id.to_string(),
                url: url.to_string(),
                last_seen_ms: None,
                metrics: MetricsSnapshot::default(),
                stopped: false,
            });
        entry.url = url.to_string();
        entry.last_seen_ms = Some(now);
        entry.stopped = false;
        tracing::info!(node = id, url, "memory node registered");
    }

    pub fn memory_heartbeat(&self, report: &PeerReport) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        let Some(entry) = memory.nodes.get_mut(&report.peer_id) else {
            return Err(Error::UnknownPeer(report.peer_id.clone()));
        };
        entry.last_seen_ms = Some(self.clock.now_ms());
        entry.metrics = MetricsSnapshot::from_report(report);
        drop(memory);
        self.refresh_memory_leader();
        Ok(())
    }

    pub fn db_leader(&self) -> Option<String> {
        let db = self.db.lock().unwrap();
        let now = self.clock.now_ms();
        db.leader_id
            .as_ref()
            .filter(|id| {
                db.nodes
                    .get(*id)
                    .map(|n| self.node_status(n, now) == PeerStatus::Active)
                    .unwrap_or(false)
            })
            .cloned()
    }

    pub fn db_leader_view(&self) -> (Option<String>, Option<String>) {
        let db = self.db.lock().unwrap();
        let url = db
            .leader_id
            .as_ref()
            .and_then(|id| db.nodes.get(id))
            .map(|n| n.url.clone());
        (db.leader_id.clone(), url)
    }

    pub fn memory_leader(&self) -> Option<String> {
        self.memory.lock().unwrap().leader_id.clone()
    }

    /// Deterministic DB-leader pick: the first active node in id order.
    /// The chosen node is notified via its promote endpoint; assignment
    /// only sticks if the notification lands.
    pub async fn elect_db_leader(&self) {
        if !self.is_federated_leader() {
            return;
        }
        let candidate = {
            let db = self.db.lock().unwrap();
            let now = self.clock.now_ms();
            let mut active: Vec<&ManagedNode> = db
                .nodes
                .values()
                .filter(|n| self.node_status(n, now) == PeerStatus::Active)
                .collect();
            active.sort_by(|a, b| a.id.cmp(&b.id));
            active.first().map(|n| (n.id.clone(), n.url.clone()))
        };
        let Some((id, url)) = candidate else {
            tracing::warn!("no active DB node, cluster stays leaderless");
            let mut db = self.db.lock().unwrap();
            db.leader_id = None;
            return;
        };
        self.assign_leader(&id, &url).await;
    }

    async fn assign_leader(&self, id: &str, url: &str) {
        match self.promoter.promote(url).await {
            Ok(()) => {
                tracing::info!(node = id, "DB leader assigned");
                self.db.lock().unwrap().leader_id = Some(id.to_string());
            }
            Err(e) => {
                tracing::warn!(node = id, error = %e, "promote delivery failed");
            }
        }
    }

    /// Periodic liveness sweep. A stale assigned leader costs the group its
    /// leadership immediately; a replacement is picked if any node is
    /// still active.
    pub async fn health_sweep(&self) {
        let leader_lost = {
            let db = self.db.lock().unwrap();
            let now = self.clock.now_ms();
            match &db.leader_id {
                Some(id) => db
                    .nodes
                    .get(id)
                    .map(|n| self.node_status(n, now) != PeerStatus::Active)
                    .unwrap_or(true),
                None => false,
            }
        };
        if leader_lost {
            tracing::warn!("assigned DB leader went stale");
            self.db.lock().unwrap().leader_id = None;
            self.elect_db_leader().await;
        }
        self.refresh_memory_leader();
    }

    /// Reconcile pass run by the federated leader: make sure a leader is
    /// assigned whenever any node is active.
    pub async fn reconcile(&self) {
        if !self.is_federated_leader() {
            return;
        }
        if self.db_leader().is_none() {
            self.elect_db_leader().await;
        }
    }

    /// Stop a DB node from the federated tier: drop it from the active set
    /// and hand its leadership elsewhere if it held one.
    pub async fn stop_node(&self, id: &str) -> Result<()> {
        let was_leader = {
            let mut db = self.db.lock().unwrap();
            let Some(entry) = db.nodes.get_mut(id) else {
                return Err(Error::UnknownPeer(id.to_string()));
            };
            entry.stopped = true;
            db.leader_id.as_deref() == Some(id)
        };
        tracing::info!(node = id, "DB node stopped");
        if was_leader {
            self.db.lock().unwrap().leader_id = None;
            self.elect_db_leader().await;
        }
        Ok(())
    }

    /// Clear the stopped mark; the node turns active again on its next
    /// liveness report.
    pub fn restart_node(&self, id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let Some(entry) = db.nodes.get_mut(id) else {
            return Err(Error::UnknownPeer(id.to_string()));
        };
        entry.stopped = false;
        entry.last_seen_ms = None;
        tracing::info!(node = id, "DB node restart requested");
        Ok(())
    }

    pub async fn remove_node(&self, id: &str) -> Result<()> {
        let was_leader = {
            let mut db = self.db.lock().unwrap();
            if db.nodes.remove(id).is_none() {
                return Err(Error::UnknownPeer(id.to_string()));
            }
            db.leader_id.as_deref() == Some(id)
        };
        tracing::info!(node = id, "DB node removed");
        if was_leader {
            self.db.lock().unwrap().leader_id = None;
            self.elect_db_leader().await;
        }
        Ok(())
    }

    pub fn db_nodes(&self) -> Vec<ManagedNodeView> {
        self.directory_views(&self.db)
    }

    pub fn memory_nodes(&self) -> Vec<ManagedNodeView> {
        self.directory_views(&self.memory)
    }

    fn directory_views(&self, dir: &Mutex<Directory>) -> Vec<ManagedNodeView> {
        let dir = dir.lock().unwrap();
        let now = self.clock.now_ms();
        let mut views: Vec<ManagedNodeView> = dir
            .nodes
            .values()
            .map(|n| {
                let status = self.node_status(n, now);
                ManagedNodeView {
                    id: n.id.clone(),
                    url: n.url.clone(),
                    status,
                    metrics: if status == PeerStatus::Active {
                        n.metrics
                    } else {
                        MetricsSnapshot::default()
                    },
                    last_seen: n.last_seen_ms,
                }
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    /// Memory-tier leadership never leaves the coordinator: the leader is
    /// whichever active memory node sorts first, with a preference for
    /// nodes on the local host.
    fn refresh_memory_leader(&self) {
        let mut memory = self.memory.lock().unwrap();
        let now = self.clock.now_ms();
        let mut active: Vec<&ManagedNode> = memory
            .nodes
            .values()
            .filter(|n| self.node_status(n, now) == PeerStatus::Active)
            .collect();
        active.sort_by(|a, b| {
            let a_local = is_local_url(&a.url);
            let b_local = is_local_url(&b.url);
            b_local.cmp(&a_local).then_with(|| a.id.cmp(&b.id))
        });
        let new_leader = active.first().map(|n| n.id.clone());
        if new_leader != memory.leader_id {
            tracing::info!(leader = ?new_leader, "memory-node leader changed");
            memory.leader_id = new_leader;
        }
    }

    fn node_status(&self, node: &ManagedNode, now_ms: u64) -> PeerStatus {
        if node.stopped {
            return PeerStatus::Inactive;
        }
        match node.last_seen_ms {
            Some(seen) if now_ms.saturating_sub(seen) < self.stale_threshold_ms => {
                PeerStatus::Active
            }
            _ => PeerStatus::Inactive,
        }
    }
}

fn is_local_url(url: &str) -> bool {
    url.contains("localhost") || url.contains("127.0.0.1")
}

/// Hooked into the federated election so leadership changes are visible in
/// the logs the moment they happen. Assignment work itself stays in the
/// reconcile loop.
pub struct SupervisorObserver;

impl RoleObserver for SupervisorObserver {
    fn on_leader(&self) {
        tracing::info!("took federated leadership, supervising managed clusters");
    }

    fn on_step_down(&self) {
        tracing::info!("lost federated leadership, supervision suspended");
    }
}

/// Background loops for the supervisor: the liveness sweep runs on every
/// coordinator, the reconcile pass is a no-op unless this coordinator is
/// the federated leader.
pub fn spawn_supervision_loops(
    supervisor: Arc<FederationSupervisor>,
    sweep_interval_ms: u64,
    reconcile_interval_ms: u64,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let sweeper = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(sweep_interval_ms)).await;
                supervisor.health_sweep().await;
            }
        })
    };
    let reconciler = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(reconcile_interval_ms)).await;
            supervisor.reconcile().await;
        }
    });
    (sweeper, reconciler)
}
