//! In-process mesh for driving elections deterministically.
//!
//! Nodes talk through a shared [`Mesh`] instead of real sockets; tests
//! advance a [`ManualClock`] and call `tick()` by hand, so no sleeps and no
//! timing flakiness. The mesh can take single nodes down or split the group
//! into partitions.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fedraft::cluster::{ElectionNode, ElectionTiming, PeerRegistry, RaftTransport, Role};
use fedraft::common::{
    Clock, Error, HeartbeatRequest, HeartbeatResponse, ManualClock, Result, VoteRequest,
    VoteResponse,
};

pub const TIMING: ElectionTiming = ElectionTiming {
    election_timeout_min_ms: 150,
    election_timeout_max_ms: 300,
    heartbeat_interval_ms: 50,
};

pub const STALE_THRESHOLD_MS: u64 = 10_000;

#[derive(Default)]
pub struct Mesh {
    nodes: Mutex<HashMap<String, Arc<ElectionNode>>>,
    down: Mutex<HashSet<String>>,
    partitions: Mutex<Vec<HashSet<String>>>,
}

impl Mesh {
    fn register(&self, url: &str, node: Arc<ElectionNode>) {
        self.nodes.lock().unwrap().insert(url.to_string(), node);
    }

    pub fn take_down(&self, url: &str) {
        self.down.lock().unwrap().insert(url.to_string());
    }

    pub fn bring_up(&self, url: &str) {
        self.down.lock().unwrap().remove(url);
    }

    /// Split the mesh into isolated groups of URLs. Nodes only reach nodes
    /// within their own group until `heal()` is called.
    pub fn partition(&self, groups: &[&[&str]]) {
        *self.partitions.lock().unwrap() = groups
            .iter()
            .map(|g| g.iter().map(|u| u.to_string()).collect())
            .collect();
    }

    pub fn heal(&self) {
        self.partitions.lock().unwrap().clear();
    }

    fn connect(&self, from: &str, to: &str) -> Result<Arc<ElectionNode>> {
        let down = self.down.lock().unwrap();
        if down.contains(from) || down.contains(to) {
            return Err(Error::ConnectionFailed(format!("{} unreachable", to)));
        }
        drop(down);
        let partitions = self.partitions.lock().unwrap();
        if !partitions.is_empty() {
            let same_side = partitions
                .iter()
                .any(|g| g.contains(from) && g.contains(to));
            if !same_side {
                return Err(Error::ConnectionFailed(format!(
                    "{} partitioned from {}",
                    to, from
                )));
            }
        }
        drop(partitions);
        self.nodes
            .lock()
            .unwrap()
            .get(to)
            .cloned()
            .ok_or_else(|| Error::ConnectionFailed(format!("{} not in mesh", to)))
    }
}

pub struct MeshTransport {
    mesh: Arc<Mesh>,
    from: String,
}

#[async_trait]
impl RaftTransport for MeshTransport {
    async fn request_vote(&self, peer_url: &str, req: &VoteRequest) -> Result<VoteResponse> {
        let node = self.mesh.connect(&self.from, peer_url)?;
        Ok(node.handle_vote_request(req))
    }

    async fn heartbeat(&self, peer_url: &str, req: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        let node = self.mesh.connect(&self.from, peer_url)?;
        Ok(node.handle_heartbeat(req))
    }
}

pub fn node_url(i: usize) -> String {
    format!("http://node{}", i)
}

/// Build an n-node group wired through a fresh mesh. Node ids are
/// `node1..=nodeN`, urls `http://node1..`.
pub fn build_group(n: usize, clock: &Arc<ManualClock>) -> (Arc<Mesh>, Vec<Arc<ElectionNode>>) {
    let mesh = Arc::new(Mesh::default());
    let mut nodes = Vec::with_capacity(n);
    for i in 1..=n {
        let id = format!("node{}", i);
        let url = node_url(i);
        let registry = Arc::new(PeerRegistry::new(
            id.clone(),
            url.clone(),
            STALE_THRESHOLD_MS,
            clock.clone() as Arc<dyn Clock>,
        ));
        for j in 1..=n {
            if j != i {
                registry.add_peer_with_id(&format!("node{}", j), &node_url(j), None);
            }
        }
        let transport = Arc::new(MeshTransport {
            mesh: mesh.clone(),
            from: url.clone(),
        });
        let node = Arc::new(ElectionNode::new(
            registry,
            transport,
            clock.clone() as Arc<dyn Clock>,
            TIMING,
        ));
        mesh.register(&url, node.clone());
        nodes.push(node);
    }
    (mesh, nodes)
}

/// Advance past the election timeout upper bound so the next tick of a
/// follower is guaranteed to fire an election.
pub fn advance_past_timeout(clock: &ManualClock) {
    clock.advance(TIMING.election_timeout_max_ms + 1);
}

/// One leader heartbeat round: advance by the heartbeat interval and tick.
pub async fn heartbeat_round(leader: &Arc<ElectionNode>, clock: &ManualClock) {
    clock.advance(TIMING.heartbeat_interval_ms);
    leader.tick().await;
}

pub fn leaders(nodes: &[Arc<ElectionNode>]) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.snapshot().role == Role::Leader)
        .map(|n| n.self_id().to_string())
        .collect()
}
