//! RPC delivery for votes and heartbeats
//!
//! Small seam so tests can run whole groups in-process. Production delivery
//! is JSON over HTTP with a per-request timeout; the transport is assumed
//! at-least-once and possibly reordered, which the election machine tolerates
//! by ignoring stale terms.

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Error, HeartbeatRequest, HeartbeatResponse, Result, VoteRequest, VoteResponse};

#[async_trait]
pub trait RaftTransport: Send + Sync {
    async fn request_vote(&self, peer_url: &str, req: &VoteRequest) -> Result<VoteResponse>;
    async fn heartbeat(&self, peer_url: &str, req: &HeartbeatRequest) -> Result<HeartbeatResponse>;
}

/// HTTP transport. The route prefix distinguishes the two tiers: `/raft` for
/// DB-node groups, `/federated/raft` for the federated group.
pub struct HttpTransport {
    client: reqwest::Client,
    prefix: &'static str,
}

impl HttpTransport {
    pub fn new(prefix: &'static str, rpc_timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(rpc_timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, prefix }
    }

    async fn post<B: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<R> {
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("{} returned {}", url, resp.status())));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl RaftTransport for HttpTransport {
    async fn request_vote(&self, peer_url: &str, req: &VoteRequest) -> Result<VoteResponse> {
        self.post(format!("{}{}/vote", peer_url, self.prefix), req)
            .await
    }

    async fn heartbeat(&self, peer_url: &str, req: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.post(format!("{}{}/heartbeat", peer_url, self.prefix), req)
            .await
    }
}
