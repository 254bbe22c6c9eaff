//! DB-node group: election, liveness, quorum, and leader-gated admin commands
//!
//! One `GroupServer` per storage node:
//! - Peer registry + liveness tracking (heartbeat reports, leader probes)
//! - Raft-style leader election among the group's members
//! - Command authority gate for cluster-mutating admin operations
//! - HTTP surface for status, commands, and Raft RPC delivery
//! - Optional registration/heartbeat sync toward federated coordinators

pub mod authority;
pub mod election;
pub mod http;
pub mod quorum;
pub mod registry;
pub mod server;
pub mod transport;

pub use authority::{AdminCommand, CommandGate, CommandRejection, LeadershipView};
pub use election::{
    spawn_tick_loop, ElectionNode, ElectionSnapshot, ElectionTiming, Role, RoleObserver,
};
pub use quorum::{required_majority, QuorumView};
pub use registry::{
    derive_peer_id, MetricsSnapshot, Peer, PeerRegistry, PeerRole, PeerStatus, PeerView,
};
pub use server::GroupServer;
pub use transport::{HttpTransport, RaftTransport};
