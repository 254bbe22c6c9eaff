//! Federated coordination tier
//!
//! Coordinators run the same election machine as DB groups, just with
//! tighter timing, and additionally supervise the nested clusters: they
//! track DB-node and memory-node liveness, assign DB-group leadership, and
//! gate cross-cluster admin commands behind the federated leadership.

pub mod http;
pub mod server;
pub mod supervisor;

pub use server::FederationServer;
pub use supervisor::{
    FederationSupervisor, HeartbeatAck, HttpPromoteClient, ManagedNodeView, PromoteClient,
};
