//! Wire messages exchanged between peers
//!
//! JSON over HTTP, camelCase on the wire. The same vote/heartbeat shapes
//! serve both tiers (DB-node groups and the federated group).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Empty AppendEntries. Only leadership metadata travels on this tier, so a
/// heartbeat carries nothing but the leader's claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub term: u64,
    pub leader_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub term: u64,
    pub success: bool,
}

/// Self-reported liveness + metrics push, accepted from any peer regardless
/// of its role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerReport {
    pub peer_id: String,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub ram_used: u64,
    #[serde(default)]
    pub ram_total: u64,
    #[serde(default)]
    pub disk_used: u64,
    #[serde(default)]
    pub disk_total: u64,
    #[serde(default)]
    pub latency_ms: u64,
    /// Sender's wall-clock timestamp. Informational only: last-seen is always
    /// stamped from the receiver's clock.
    #[serde(default)]
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_fields_are_camel_case() {
        let req = VoteRequest {
            term: 3,
            candidate_id: "node-1".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["candidateId"], "node-1");
        assert_eq!(json["term"], 3);
    }

    #[test]
    fn peer_report_defaults_missing_metrics() {
        let report: PeerReport =
            serde_json::from_str(r#"{"peerId":"node-2","cpuUsage":12.5}"#).unwrap();
        assert_eq!(report.peer_id, "node-2");
        assert_eq!(report.cpu_usage, 12.5);
        assert_eq!(report.ram_total, 0);
    }
}
