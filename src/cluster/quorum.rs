//! Quorum math
//!
//! Pure functions over the registry size and the liveness view. The election
//! machine uses `required_majority` to gate vote counts; the status surface
//! uses `QuorumView` to explain leaderless states to operators.

use serde::{Deserialize, Serialize};

/// Strict majority for a group of `n` registered peers.
pub fn required_majority(n: usize) -> usize {
    n / 2 + 1
}

/// Derived quorum state. Never persisted, recomputed on every liveness
/// update and status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuorumView {
    pub required: usize,
    pub active: usize,
    pub has_quorum: bool,
}

impl QuorumView {
    pub fn new(registry_size: usize, active: usize) -> Self {
        let required = required_majority(registry_size);
        Self {
            required,
            active,
            has_quorum: active >= required,
        }
    }
}

impl std::fmt::Display for QuorumView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} servers required for quorum, {} active",
            self.required, self.active
        )
    }
}
