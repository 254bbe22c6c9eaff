//! # fedraft
//!
//! The distributed-coordination core of a clustered document store:
//! - Raft-style leader election per storage cluster (one writer per group)
//! - A second, federated election tier coordinating multiple clusters
//! - Peer liveness tracking from heartbeat/metrics reports
//! - Leader-gated admin commands (stop/pause/resume/restart/remove)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          Federated Coordinators             │
//! │  (election among coordinators; the single   │
//! │   federated leader gates cross-cluster      │
//! │   admin commands and assigns DB leaders)    │
//! └──────┬──────────────────┬───────────────────┘
//!        │ register/        │
//!        │ heartbeat        │
//! ┌──────▼──────┐    ┌──────▼──────┐
//! │ DB group A  │    │ DB group B  │
//! │ 3 nodes,    │    │ 3 nodes,    │
//! │ own election│    │ own election│
//! └─────────────┘    └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a DB-node group member
//! ```bash
//! fedraft-node serve \
//!   --id node-1 \
//!   --bind 0.0.0.0:8080 \
//!   --advertise http://localhost:8080 \
//!   --peers http://localhost:8081,http://localhost:8082
//! ```
//!
//! ### Start a federated coordinator
//! ```bash
//! fedraft-fed serve \
//!   --id fed-1 \
//!   --bind 0.0.0.0:9080 \
//!   --advertise http://localhost:9080 \
//!   --peers http://localhost:9081
//! ```

pub mod cluster;
pub mod common;
pub mod federation;

// Re-export commonly used types
pub use cluster::GroupServer;
pub use common::{Config, Error, Result};
pub use federation::FederationServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
