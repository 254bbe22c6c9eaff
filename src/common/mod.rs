//! Common utilities and types shared across fedraft

pub mod clock;
pub mod config;
pub mod error;
pub mod rpc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, FederationConfig, NodeConfig, NodeTier};
pub use error::{Error, Result};
pub use rpc::{HeartbeatRequest, HeartbeatResponse, PeerReport, VoteRequest, VoteResponse};
