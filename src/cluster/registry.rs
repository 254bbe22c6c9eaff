//! Peer registry and liveness tracking
//!
//! Holds the known members of one group, their last-observed liveness and
//! their latest self-reported metrics. Status is derived at snapshot time:
//! an explicit pause always wins, the local node is always active, everything
//! else depends on heartbeat recency against the stale threshold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::common::{Clock, Error, PeerReport, Result};

use super::quorum::QuorumView;

/// Consecutive probe failures before a peer is marked inactive.
const MAX_PROBE_FAILURES: u32 = 5;

/// Declared role of a peer, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerRole {
    Leader,
    Candidate,
    Follower,
    Unknown,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Leader => write!(f, "LEADER"),
            PeerRole::Candidate => write!(f, "CANDIDATE"),
            PeerRole::Follower => write!(f, "FOLLOWER"),
            PeerRole::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Operational status, derived from pause state and heartbeat recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerStatus {
    Active,
    Inactive,
    Paused,
}

/// Latest self-reported resource metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cpu_usage: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub latency_ms: u64,
}

impl MetricsSnapshot {
    pub fn from_report(report: &PeerReport) -> Self {
        Self {
            cpu_usage: report.cpu_usage,
            ram_used: report.ram_used,
            ram_total: report.ram_total,
            disk_used: report.disk_used,
            disk_total: report.disk_total,
            latency_ms: report.latency_ms,
        }
    }
}

/// A registered group member.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: String,
    pub url: String,
    pub role: PeerRole,
    pub paused: bool,
    pub last_seen_ms: Option<u64>,
    pub metrics: MetricsSnapshot,
    pub description: Option<String>,
    probe_failures: u32,
    probe_dead: bool,
}

impl Peer {
    fn new(id: String, url: String, role: PeerRole) -> Self {
        Self {
            id,
            url,
            role,
            paused: false,
            last_seen_ms: None,
            metrics: MetricsSnapshot::default(),
            description: None,
            probe_failures: 0,
            probe_dead: false,
        }
    }
}

/// Read-only view of a peer with its derived status. Metrics are zeroed for
/// peers that are not active so dashboards never show stale numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    pub id: String,
    pub url: String,
    pub role: PeerRole,
    pub status: PeerStatus,
    pub metrics: MetricsSnapshot,
    pub last_seen: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Shared registry for one group. Interior mutability keeps liveness updates
/// and admin mutations for the same group mutually exclusive.
pub struct PeerRegistry {
    self_id: String,
    self_url: String,
    peers: Mutex<HashMap<String, Peer>>,
    stale_threshold_ms: u64,
    clock: Arc<dyn Clock>,
}

impl PeerRegistry {
    pub fn new(
        self_id: impl Into<String>,
        self_url: impl Into<String>,
        stale_threshold_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let self_id = self_id.into();
        let self_url = self_url.into();
        let mut peers = HashMap::new();
        peers.insert(
            self_id.clone(),
            Peer::new(self_id.clone(), self_url.clone(), PeerRole::Follower),
        );
        Self {
            self_id,
            self_url,
            peers: Mutex::new(peers),
            stale_threshold_ms,
            clock,
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    pub fn stale_threshold_ms(&self) -> u64 {
        self.stale_threshold_ms
    }

    /// Seed peers from config at startup. Entries are either a plain URL
    /// (the id is derived from it) or `id@url` when the peer runs under an
    /// explicit id. Idempotent on URL.
    pub fn seed(&self, entries: &[String]) {
        for entry in entries {
            match entry.split_once('@') {
                Some((id, url)) if !id.is_empty() && url.starts_with("http") => {
                    self.add_peer_with_id(id, url, None);
                }
                _ => {
                    let _ = self.add_peer(entry, None);
                }
            }
        }
    }

    /// Register a peer by URL. Re-registering an existing URL refreshes its
    /// description and returns the existing entry.
    pub fn add_peer(&self, url: &str, description: Option<String>) -> Result<Peer> {
        let mut peers = self.peers.lock().unwrap();
        if let Some(existing) = peers.values_mut().find(|p| p.url == url) {
            if description.is_some() {
                existing.description = description;
            }
            existing.probe_dead = false;
            existing.probe_failures = 0;
            return Ok(existing.clone());
        }
        let id = derive_peer_id(url);
        let mut peer = Peer::new(id.clone(), url.to_string(), PeerRole::Follower);
        peer.description = description;
        peers.insert(id.clone(), peer.clone());
        tracing::info!(peer = %id, url = %url, "peer registered");
        Ok(peer)
    }

    /// Register a peer under a caller-provided id (federated tier keeps the
    /// node's own id rather than deriving one).
    pub fn add_peer_with_id(&self, id: &str, url: &str, description: Option<String>) -> Peer {
        let mut peers = self.peers.lock().unwrap();
        let peer = peers
            .entry(id.to_string())
            .or_insert_with(|| Peer::new(id.to_string(), url.to_string(), PeerRole::Unknown));
        peer.url = url.to_string();
        if description.is_some() {
            peer.description = description;
        }
        peer.clone()
    }

    /// Remove a peer by id or URL. Removing an unknown peer is an error and
    /// mutates nothing.
    pub fn remove(&self, key: &str) -> Result<Peer> {
        let mut peers = self.peers.lock().unwrap();
        let id = resolve_key(&peers, key).ok_or_else(|| Error::UnknownPeer(key.to_string()))?;
        let peer = peers.remove(&id).expect("resolved id is present");
        tracing::info!(peer = %id, "peer removed from registry");
        Ok(peer)
    }

    /// Record a heartbeat/metrics report. Updates last-seen and the metrics
    /// snapshot unconditionally, even from followers, but never resurrects a
    /// peer the registry does not know.
    pub fn record_heartbeat(&self, report: &PeerReport) -> Result<()> {
        let mut peers = self.peers.lock().unwrap();
        let peer = peers
            .get_mut(&report.peer_id)
            .ok_or_else(|| Error::UnknownPeer(report.peer_id.clone()))?;
        peer.last_seen_ms = Some(self.clock.now_ms());
        peer.metrics = MetricsSnapshot::from_report(report);
        peer.probe_failures = 0;
        peer.probe_dead = false;
        Ok(())
    }

    /// Record the outcome of a leader-side heartbeat probe. A peer is only
    /// marked dead after several consecutive failures so one dropped packet
    /// does not flap the cluster view.
    pub fn record_probe(&self, id: &str, ok: bool) {
        let mut peers = self.peers.lock().unwrap();
        let Some(peer) = peers.get_mut(id) else {
            return;
        };
        if ok {
            if peer.probe_dead {
                tracing::info!(peer = %id, "peer reachable again");
            }
            peer.probe_failures = 0;
            peer.probe_dead = false;
            peer.last_seen_ms = Some(self.clock.now_ms());
        } else {
            peer.probe_failures += 1;
            if peer.probe_failures >= MAX_PROBE_FAILURES && !peer.probe_dead {
                peer.probe_dead = true;
                tracing::warn!(peer = %id, failures = peer.probe_failures, "peer marked inactive after repeated probe failures");
            }
        }
    }

    /// Pause a peer: it keeps its registration but stops being counted as
    /// active and stops receiving replication traffic. Pausing an already
    /// paused peer succeeds.
    pub fn pause(&self, key: &str) -> Result<()> {
        self.set_paused(key, true)
    }

    /// Clear an explicit pause. Resuming an active peer succeeds.
    pub fn resume(&self, key: &str) -> Result<()> {
        self.set_paused(key, false)
    }

    fn set_paused(&self, key: &str, paused: bool) -> Result<()> {
        let mut peers = self.peers.lock().unwrap();
        let id = resolve_key(&peers, key).ok_or_else(|| Error::UnknownPeer(key.to_string()))?;
        let peer = peers.get_mut(&id).expect("resolved id is present");
        if peer.paused != paused {
            tracing::info!(peer = %id, paused, "peer pause state changed");
        }
        peer.paused = paused;
        Ok(())
    }

    /// Mark a peer stopped: drop its last-seen so it derives INACTIVE until
    /// it reports again.
    pub fn mark_stopped(&self, key: &str) -> Result<()> {
        let mut peers = self.peers.lock().unwrap();
        let id = resolve_key(&peers, key).ok_or_else(|| Error::UnknownPeer(key.to_string()))?;
        let peer = peers.get_mut(&id).expect("resolved id is present");
        peer.last_seen_ms = None;
        peer.probe_dead = true;
        Ok(())
    }

    pub fn set_role(&self, id: &str, role: PeerRole) {
        let mut peers = self.peers.lock().unwrap();
        if let Some(peer) = peers.get_mut(id) {
            peer.role = role;
        }
    }

    /// Set every peer's role from the leader's perspective: the leader id
    /// gets LEADER, everyone else FOLLOWER.
    pub fn set_leader(&self, leader_id: &str) {
        let mut peers = self.peers.lock().unwrap();
        for peer in peers.values_mut() {
            peer.role = if peer.id == leader_id {
                PeerRole::Leader
            } else {
                PeerRole::Follower
            };
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.lock().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn url_of(&self, id: &str) -> Option<String> {
        self.peers.lock().unwrap().get(id).map(|p| p.url.clone())
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        let peers = self.peers.lock().unwrap();
        resolve_key(&peers, key)
    }

    /// URLs of every member except self. Used for vote solicitation.
    pub fn member_urls(&self) -> Vec<(String, String)> {
        self.peers
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.id != self.self_id)
            .map(|p| (p.id.clone(), p.url.clone()))
            .collect()
    }

    /// URLs of members that should receive leader heartbeats: everyone but
    /// self and explicitly paused peers.
    pub fn replication_targets(&self) -> Vec<(String, String)> {
        self.peers
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.id != self.self_id && !p.paused)
            .map(|p| (p.id.clone(), p.url.clone()))
            .collect()
    }

    fn derive_status(&self, peer: &Peer, now_ms: u64) -> PeerStatus {
        if peer.paused {
            return PeerStatus::Paused;
        }
        if peer.id == self.self_id {
            return PeerStatus::Active;
        }
        if peer.probe_dead {
            return PeerStatus::Inactive;
        }
        match peer.last_seen_ms {
            Some(seen) if now_ms.saturating_sub(seen) < self.stale_threshold_ms => {
                PeerStatus::Active
            }
            _ => PeerStatus::Inactive,
        }
    }

    /// Derived view of the whole group, sorted by id for stable output.
    pub fn snapshot(&self) -> Vec<PeerView> {
        let now_ms = self.clock.now_ms();
        let peers = self.peers.lock().unwrap();
        let mut views: Vec<PeerView> = peers
            .values()
            .map(|peer| {
                let status = self.derive_status(peer, now_ms);
                PeerView {
                    id: peer.id.clone(),
                    url: peer.url.clone(),
                    role: peer.role,
                    status,
                    // Stale metrics on a dead peer mislead operators; report
                    // zeros instead.
                    metrics: if status == PeerStatus::Active {
                        peer.metrics
                    } else {
                        MetricsSnapshot::default()
                    },
                    last_seen: peer.last_seen_ms,
                    description: peer.description.clone(),
                }
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    /// Current quorum view, recomputed from scratch on every call.
    pub fn quorum(&self) -> QuorumView {
        let now_ms = self.clock.now_ms();
        let peers = self.peers.lock().unwrap();
        let active = peers
            .values()
            .filter(|p| self.derive_status(p, now_ms) == PeerStatus::Active)
            .count();
        QuorumView::new(peers.len(), active)
    }
}

fn resolve_key(peers: &HashMap<String, Peer>, key: &str) -> Option<String> {
    if peers.contains_key(key) {
        return Some(key.to_string());
    }
    peers
        .values()
        .find(|p| p.url == key)
        .map(|p| p.id.clone())
}

/// Stable id for a peer registered by URL alone. Every member must derive
/// the same id for the same URL regardless of toolchain, so this uses a
/// fixed CRC-32 rather than the process-local default hasher.
pub fn derive_peer_id(url: &str) -> String {
    format!("node-{:08x}", crc32fast::hash(url.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManualClock;

    fn registry(clock: Arc<ManualClock>) -> PeerRegistry {
        PeerRegistry::new("node-1", "http://localhost:8080", 10_000, clock)
    }

    #[test]
    fn self_is_always_active_without_heartbeat() {
        let clock = Arc::new(ManualClock::new(100_000));
        let reg = registry(clock);
        let views = reg.snapshot();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, PeerStatus::Active);
    }

    #[test]
    fn staleness_boundary_at_threshold() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock.clone());
        let peer = reg.add_peer("http://localhost:8081", None).unwrap();
        reg.record_heartbeat(&PeerReport {
            peer_id: peer.id.clone(),
            ..Default::default()
        })
        .unwrap();

        clock.advance(9_999);
        let view = |reg: &PeerRegistry, id: &str| {
            reg.snapshot().into_iter().find(|v| v.id == id).unwrap()
        };
        assert_eq!(view(&reg, &peer.id).status, PeerStatus::Active);

        clock.advance(10_001 - 9_999);
        assert_eq!(view(&reg, &peer.id).status, PeerStatus::Inactive);
    }

    #[test]
    fn pause_wins_over_recent_heartbeat() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock);
        let peer = reg.add_peer("http://localhost:8081", None).unwrap();
        reg.record_heartbeat(&PeerReport {
            peer_id: peer.id.clone(),
            ..Default::default()
        })
        .unwrap();
        reg.pause(&peer.id).unwrap();
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Paused);
        // Idempotent
        reg.pause(&peer.id).unwrap();
        reg.resume(&peer.url).unwrap();
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Active);
    }

    #[test]
    fn inactive_peer_reports_zeroed_metrics() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock.clone());
        let peer = reg.add_peer("http://localhost:8081", None).unwrap();
        reg.record_heartbeat(&PeerReport {
            peer_id: peer.id.clone(),
            cpu_usage: 88.5,
            ram_used: 4096,
            ram_total: 8192,
            ..Default::default()
        })
        .unwrap();
        clock.advance(60_000);
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Inactive);
        assert_eq!(view.metrics, MetricsSnapshot::default());
    }

    #[test]
    fn heartbeat_from_unknown_peer_is_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock);
        let err = reg
            .record_heartbeat(&PeerReport {
                peer_id: "ghost".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPeer(_)));
    }

    #[test]
    fn probe_failures_mark_inactive_after_threshold() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock);
        let peer = reg.add_peer("http://localhost:8081", None).unwrap();
        reg.record_heartbeat(&PeerReport {
            peer_id: peer.id.clone(),
            ..Default::default()
        })
        .unwrap();
        for _ in 0..4 {
            reg.record_probe(&peer.id, false);
        }
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Active);
        reg.record_probe(&peer.id, false);
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Inactive);
        // Recovery clears the probe verdict
        reg.record_probe(&peer.id, true);
        let view = reg.snapshot().into_iter().find(|v| v.id == peer.id).unwrap();
        assert_eq!(view.status, PeerStatus::Active);
    }

    #[test]
    fn add_peer_is_idempotent_on_url() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock);
        let a = reg.add_peer("http://localhost:8081", None).unwrap();
        let b = reg
            .add_peer("http://localhost:8081", Some("replica".into()))
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn derived_peer_ids_are_stable_across_builds() {
        // Every member must resolve the same id for the same URL, so the
        // derivation is pinned to CRC-32 and must never drift.
        assert_eq!(derive_peer_id("http://localhost:8080"), "node-72feb646");
        assert_eq!(
            derive_peer_id("http://localhost:8080"),
            derive_peer_id("http://localhost:8080")
        );
        assert_ne!(
            derive_peer_id("http://localhost:8080"),
            derive_peer_id("http://localhost:8081")
        );
    }

    #[test]
    fn remove_unknown_peer_is_an_error() {
        let clock = Arc::new(ManualClock::new(0));
        let reg = registry(clock);
        assert!(matches!(
            reg.remove("http://nowhere:1"),
            Err(Error::UnknownPeer(_))
        ));
    }
}
