//! Leader election state machine
//!
//! One instance per group. All `(term, role, leader)` mutations are
//! serialized behind a single lock; RPC fan-out happens outside it. The same
//! machine runs both tiers: DB-node groups and the federated coordinator
//! group differ only in timing and transport prefix.
//!
//! Transition rules:
//! - Follower -> Candidate when no leader heartbeat lands within the
//!   randomized election timeout; the term increments and votes are
//!   solicited from every registered peer.
//! - Candidate -> Leader on a strict majority of votes (self included)
//!   for the candidate's term.
//! - Candidate -> Follower on a heartbeat or vote request carrying a term
//!   at least as high as its own, or when its own election times out
//!   (retry after a freshly randomized backoff).
//! - Leader -> Follower only on a strictly higher term. A leader at a lower
//!   term can never remain leader; this is the split-brain guard.
//!
//! A peer grants at most one vote per term and answers duplicate vote
//! requests identically. Messages for stale terms are ignored, never errors.

use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::{
    Clock, HeartbeatRequest, HeartbeatResponse, VoteRequest, VoteResponse,
};

use super::quorum::required_majority;
use super::registry::{PeerRegistry, PeerRole};
use super::transport::RaftTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "FOLLOWER"),
            Role::Candidate => write!(f, "CANDIDATE"),
            Role::Leader => write!(f, "LEADER"),
        }
    }
}

impl From<Role> for PeerRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Follower => PeerRole::Follower,
            Role::Candidate => PeerRole::Candidate,
            Role::Leader => PeerRole::Leader,
        }
    }
}

/// Election timing knobs, all in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ElectionTiming {
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ElectionTiming {
    fn default() -> Self {
        Self {
            election_timeout_min_ms: 6_000,
            election_timeout_max_ms: 12_000,
            heartbeat_interval_ms: 1_500,
        }
    }
}

impl ElectionTiming {
    fn random_timeout(&self) -> u64 {
        if self.election_timeout_max_ms <= self.election_timeout_min_ms {
            return self.election_timeout_min_ms;
        }
        rand::thread_rng().gen_range(self.election_timeout_min_ms..self.election_timeout_max_ms)
    }
}

/// Hook for role transitions, used by the federation supervisor to take and
/// release control of the nested DB cluster.
pub trait RoleObserver: Send + Sync {
    fn on_leader(&self);
    fn on_step_down(&self);
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSnapshot {
    pub term: u64,
    pub role: Role,
    pub leader_id: Option<String>,
    pub leader_url: Option<String>,
}

struct ElectionState {
    term: u64,
    role: Role,
    voted_for: Option<String>,
    leader_id: Option<String>,
    last_heartbeat_ms: u64,
    timeout_ms: u64,
}

pub struct ElectionNode {
    self_id: String,
    inner: Mutex<ElectionState>,
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn RaftTransport>,
    clock: Arc<dyn Clock>,
    timing: ElectionTiming,
    observer: Mutex<Option<Arc<dyn RoleObserver>>>,
}

impl ElectionNode {
    pub fn new(
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn RaftTransport>,
        clock: Arc<dyn Clock>,
        timing: ElectionTiming,
    ) -> Self {
        let now = clock.now_ms();
        let timeout = timing.random_timeout();
        Self {
            self_id: registry.self_id().to_string(),
            inner: Mutex::new(ElectionState {
                term: 0,
                role: Role::Follower,
                voted_for: None,
                leader_id: None,
                last_heartbeat_ms: now,
                timeout_ms: timeout,
            }),
            registry,
            transport,
            clock,
            timing,
            observer: Mutex::new(None),
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn RoleObserver>) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn is_leader(&self) -> bool {
        self.inner.lock().unwrap().role == Role::Leader
    }

    pub fn current_term(&self) -> u64 {
        self.inner.lock().unwrap().term
    }

    pub fn leader_id(&self) -> Option<String> {
        self.inner.lock().unwrap().leader_id.clone()
    }

    pub fn leader_url(&self) -> Option<String> {
        let leader = self.leader_id()?;
        self.registry.url_of(&leader)
    }

    /// Record an externally reported leader without changing term or role.
    /// Used by leaderless followers so rejections and status queries can
    /// name a redirect target before that leader's first heartbeat lands.
    pub fn adopt_leader(&self, leader_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.role == Role::Leader || inner.leader_id.is_some() {
            return;
        }
        inner.leader_id = Some(leader_id.to_string());
        drop(inner);
        self.registry.set_leader(leader_id);
    }

    pub fn snapshot(&self) -> ElectionSnapshot {
        let inner = self.inner.lock().unwrap();
        let leader_url = inner
            .leader_id
            .as_deref()
            .and_then(|id| self.registry.url_of(id));
        ElectionSnapshot {
            term: inner.term,
            role: inner.role,
            leader_id: inner.leader_id.clone(),
            leader_url,
        }
    }

    /// Handle an incoming RequestVote. Grants at most one vote per term;
    /// duplicate requests from the same candidate are answered identically.
    pub fn handle_vote_request(&self, req: &VoteRequest) -> VoteResponse {
        if !self.registry.contains(&req.candidate_id) {
            tracing::warn!(candidate = %req.candidate_id, "ignoring vote request from non-member");
            return VoteResponse {
                term: self.current_term(),
                vote_granted: false,
            };
        }

        let mut stepped_down = false;
        let response = {
            let mut inner = self.inner.lock().unwrap();
            if req.term > inner.term {
                stepped_down = self.step_down_locked(&mut inner, req.term, None);
            }
            if req.term < inner.term {
                // Stale term: deny, not an error.
                VoteResponse {
                    term: inner.term,
                    vote_granted: false,
                }
            } else {
                let grant = match &inner.voted_for {
                    None => true,
                    Some(existing) => existing == &req.candidate_id,
                };
                if grant {
                    inner.voted_for = Some(req.candidate_id.clone());
                    inner.last_heartbeat_ms = self.clock.now_ms();
                }
                VoteResponse {
                    term: inner.term,
                    vote_granted: grant,
                }
            }
        };
        if stepped_down {
            self.notify_step_down();
        }
        if response.vote_granted {
            tracing::info!(candidate = %req.candidate_id, term = response.term, "vote granted");
        }
        response
    }

    /// Handle an incoming leader heartbeat.
    pub fn handle_heartbeat(&self, req: &HeartbeatRequest) -> HeartbeatResponse {
        if !self.registry.contains(&req.leader_id) {
            tracing::warn!(leader = %req.leader_id, "ignoring heartbeat from non-member");
            return HeartbeatResponse {
                term: self.current_term(),
                success: false,
            };
        }

        let mut stepped_down = false;
        let response = {
            let mut inner = self.inner.lock().unwrap();
            if req.term < inner.term {
                return HeartbeatResponse {
                    term: inner.term,
                    success: false,
                };
            }
            if req.term > inner.term {
                stepped_down = self.step_down_locked(&mut inner, req.term, None);
            } else if inner.role == Role::Leader && req.leader_id != self.self_id {
                // Equal-term claim from another leader cannot be honored:
                // abdication requires a strictly higher term.
                return HeartbeatResponse {
                    term: inner.term,
                    success: false,
                };
            } else if inner.role == Role::Candidate {
                // A valid leader exists for our term; defer to it.
                inner.role = Role::Follower;
            }
            inner.leader_id = Some(req.leader_id.clone());
            inner.last_heartbeat_ms = self.clock.now_ms();
            HeartbeatResponse {
                term: inner.term,
                success: true,
            }
        };
        if response.success {
            self.registry.set_leader(&req.leader_id);
        }
        if stepped_down {
            self.notify_step_down();
        }
        response
    }

    /// Called by the background loop. Leaders fan out heartbeats; everyone
    /// else watches for an election timeout.
    pub async fn tick(&self) {
        enum Action {
            Heartbeat(u64),
            Election,
        }

        let now = self.clock.now_ms();
        let action = {
            let mut inner = self.inner.lock().unwrap();
            match inner.role {
                Role::Leader => {
                    if now.saturating_sub(inner.last_heartbeat_ms)
                        >= self.timing.heartbeat_interval_ms
                    {
                        inner.last_heartbeat_ms = now;
                        Some(Action::Heartbeat(inner.term))
                    } else {
                        None
                    }
                }
                Role::Candidate => {
                    if now.saturating_sub(inner.last_heartbeat_ms) > inner.timeout_ms {
                        // Lost the election: restart as follower and retry
                        // after a fresh randomized backoff.
                        tracing::info!(term = inner.term, "election timed out without majority, backing off");
                        inner.role = Role::Follower;
                        inner.last_heartbeat_ms = now;
                        inner.timeout_ms = self.timing.random_timeout();
                        self.registry
                            .set_role(&self.self_id, PeerRole::Follower);
                    }
                    None
                }
                Role::Follower => {
                    if now.saturating_sub(inner.last_heartbeat_ms) > inner.timeout_ms {
                        Some(Action::Election)
                    } else {
                        None
                    }
                }
            }
        };

        match action {
            Some(Action::Heartbeat(term)) => self.send_heartbeats(term).await,
            Some(Action::Election) => self.start_election().await,
            None => {}
        }
    }

    /// Run one election round: bump the term, vote for self, solicit the
    /// rest of the group concurrently, and take leadership on a strict
    /// majority. Abandoned the moment a higher term is observed.
    pub async fn start_election(&self) {
        let (term, majority, peers) = {
            let mut inner = self.inner.lock().unwrap();
            inner.role = Role::Candidate;
            inner.term += 1;
            inner.voted_for = Some(self.self_id.clone());
            inner.leader_id = None;
            inner.last_heartbeat_ms = self.clock.now_ms();
            inner.timeout_ms = self.timing.random_timeout();
            (
                inner.term,
                required_majority(self.registry.len()),
                self.registry.member_urls(),
            )
        };
        self.registry.set_role(&self.self_id, PeerRole::Candidate);
        tracing::info!(term, "starting election");

        let mut votes = 1usize; // self-vote

        if peers.is_empty() {
            // Single-node group: self-vote is the majority.
            if votes >= majority {
                self.try_become_leader(term);
            }
            return;
        }

        let req = VoteRequest {
            term,
            candidate_id: self.self_id.clone(),
        };
        let solicitations = peers
            .iter()
            .map(|(_, url)| self.transport.request_vote(url, &req));
        let results = join_all(solicitations).await;

        for ((peer_id, _), result) in peers.iter().zip(results) {
            match result {
                Ok(resp) => {
                    if resp.term > term {
                        // Someone is ahead of us: abandon this election.
                        tracing::info!(peer = %peer_id, term = resp.term, "higher term observed, abandoning election");
                        if self.step_down(resp.term, None) {
                            self.notify_step_down();
                        }
                        return;
                    }
                    if resp.vote_granted {
                        votes += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!(peer = %peer_id, error = %e, "vote solicitation failed");
                }
            }
        }

        if votes >= majority {
            if self.try_become_leader(term) {
                self.send_heartbeats(term).await;
            }
        } else {
            let quorum = self.registry.quorum();
            tracing::warn!(term, votes, majority, %quorum, "election failed, staying leaderless");
        }
    }

    /// Leadership assignment from the federated tier.
    pub fn promote(&self) {
        let became_leader = {
            let mut inner = self.inner.lock().unwrap();
            if inner.role == Role::Leader {
                false
            } else {
                tracing::info!("promotion request received, transitioning to LEADER");
                self.become_leader_locked(&mut inner);
                true
            }
        };
        if became_leader {
            self.registry.set_leader(&self.self_id);
            self.notify_leader();
        }
    }

    /// Adopt a higher term (or an externally observed leader) and revert to
    /// follower. Returns true if a leadership was actually given up.
    pub fn step_down(&self, term: u64, leader_id: Option<String>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let was_leader = self.step_down_locked(&mut inner, term, leader_id);
        drop(inner);
        if was_leader {
            self.registry.set_role(&self.self_id, PeerRole::Follower);
        }
        was_leader
    }

    // Returns true if we were leader before stepping down.
    fn step_down_locked(
        &self,
        inner: &mut ElectionState,
        term: u64,
        leader_id: Option<String>,
    ) -> bool {
        let was_leader = inner.role == Role::Leader;
        if was_leader || inner.role == Role::Candidate {
            tracing::info!(old_term = inner.term, new_term = term, "stepping down to FOLLOWER");
        }
        inner.role = Role::Follower;
        // Terms never decrease.
        inner.term = inner.term.max(term);
        inner.voted_for = None;
        inner.leader_id = leader_id;
        inner.last_heartbeat_ms = self.clock.now_ms();
        inner.timeout_ms = self.timing.random_timeout();
        was_leader
    }

    fn try_become_leader(&self, election_term: u64) -> bool {
        let became_leader = {
            let mut inner = self.inner.lock().unwrap();
            // A concurrent term change cancels a won election.
            if inner.role != Role::Candidate || inner.term != election_term {
                false
            } else {
                self.become_leader_locked(&mut inner);
                true
            }
        };
        if became_leader {
            self.registry.set_leader(&self.self_id);
            self.notify_leader();
        }
        became_leader
    }

    fn become_leader_locked(&self, inner: &mut ElectionState) {
        tracing::info!(term = inner.term, node = %self.self_id, "becoming LEADER");
        inner.role = Role::Leader;
        inner.leader_id = Some(self.self_id.clone());
        inner.last_heartbeat_ms = self.clock.now_ms();
    }

    async fn send_heartbeats(&self, term: u64) {
        let targets = self.registry.replication_targets();
        if targets.is_empty() {
            return;
        }
        let req = HeartbeatRequest {
            term,
            leader_id: self.self_id.clone(),
        };
        let sends = targets
            .iter()
            .map(|(_, url)| self.transport.heartbeat(url, &req));
        let results = join_all(sends).await;

        let mut higher_term: Option<u64> = None;
        for ((peer_id, _), result) in targets.iter().zip(results) {
            match result {
                Ok(resp) => {
                    self.registry.record_probe(peer_id, true);
                    if resp.term > term {
                        higher_term = Some(higher_term.unwrap_or(0).max(resp.term));
                    }
                }
                Err(e) => {
                    tracing::debug!(peer = %peer_id, error = %e, "heartbeat delivery failed");
                    self.registry.record_probe(peer_id, false);
                }
            }
        }

        if let Some(new_term) = higher_term {
            // Immediate abdication: a leader at a lower term never stays leader.
            if self.step_down(new_term, None) {
                self.notify_step_down();
            }
        }
    }

    fn notify_leader(&self) {
        let observer = self.observer.lock().unwrap().clone();
        if let Some(obs) = observer {
            obs.on_leader();
        }
    }

    fn notify_step_down(&self) {
        let observer = self.observer.lock().unwrap().clone();
        if let Some(obs) = observer {
            obs.on_step_down();
        }
    }
}

/// Start the background election/heartbeat loop.
pub fn spawn_tick_loop(
    node: Arc<ElectionNode>,
    tick_interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(tick_interval_ms)).await;
            node.tick().await;
        }
    })
}
