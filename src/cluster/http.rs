//! HTTP API for a DB group node
//!
//! Two route families share the router: the internal consensus RPCs under
//! `/raft` (vote, heartbeat, promote) and the admin/supervision surface
//! under `/cluster`. Admin mutations are leader-gated; a non-leader answers
//! 409 with a structured rejection naming the current leader.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::common::{Error, HeartbeatRequest, PeerReport, VoteRequest};

use super::authority::{AdminCommand, CommandGate, CommandRejection};
use super::election::ElectionNode;

/// Shared state for all group-node HTTP handlers.
#[derive(Clone)]
pub struct ClusterState {
    pub election: Arc<ElectionNode>,
    pub gate: Arc<CommandGate<ElectionNode>>,
}

impl ClusterState {
    pub fn new(election: Arc<ElectionNode>) -> Self {
        let gate = Arc::new(CommandGate::new(election.clone()));
        Self { election, gate }
    }
}

pub fn create_router(state: ClusterState) -> Router {
    Router::new()
        // Consensus RPCs
        .route("/raft/vote", axum::routing::post(raft_vote))
        .route("/raft/heartbeat", axum::routing::post(raft_heartbeat))
        // Supervision surface
        .route("/cluster/status", axum::routing::get(cluster_status))
        .route("/cluster/promote", axum::routing::post(cluster_promote))
        .route("/cluster/heartbeat", axum::routing::post(cluster_heartbeat))
        .route("/cluster/register", axum::routing::post(cluster_register))
        .route("/cluster/remove", axum::routing::post(cluster_remove))
        .route("/cluster/pause", axum::routing::post(cluster_pause))
        .route("/cluster/resume", axum::routing::post(cluster_resume))
        .route("/cluster/stop", axum::routing::post(cluster_stop))
        .route("/cluster/restart", axum::routing::post(cluster_restart))
        .route("/health", axum::routing::get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn raft_vote(
    State(state): State<ClusterState>,
    axum::Json(req): axum::Json<VoteRequest>,
) -> impl IntoResponse {
    axum::Json(state.election.handle_vote_request(&req))
}

async fn raft_heartbeat(
    State(state): State<ClusterState>,
    axum::Json(req): axum::Json<HeartbeatRequest>,
) -> impl IntoResponse {
    axum::Json(state.election.handle_heartbeat(&req))
}

/// Leadership assignment from the federated coordinator.
async fn cluster_promote(State(state): State<ClusterState>) -> impl IntoResponse {
    state.election.promote();
    axum::Json(json!({ "status": "ok", "leaderId": state.election.self_id() }))
}

/// Full supervision view: election snapshot, quorum, and per-peer status
/// with metrics (zeroed for peers not currently active).
async fn cluster_status(State(state): State<ClusterState>) -> impl IntoResponse {
    let registry = state.election.registry();
    let snapshot = state.election.snapshot();
    let quorum = registry.quorum();
    let peers = registry.snapshot();
    axum::Json(json!({
        "nodeId": state.election.self_id(),
        "term": snapshot.term,
        "role": snapshot.role,
        "leaderId": snapshot.leader_id,
        "leaderUrl": snapshot.leader_url,
        "quorum": {
            "required": quorum.required,
            "active": quorum.active,
            "hasQuorum": quorum.has_quorum,
        },
        "peers": peers,
    }))
}

/// Liveness report from a peer: refreshes its last-seen stamp and stores
/// the attached metrics. Reports from unknown peers are refused without
/// mutating anything.
async fn cluster_heartbeat(
    State(state): State<ClusterState>,
    axum::Json(report): axum::Json<PeerReport>,
) -> impl IntoResponse {
    match state.election.registry().record_heartbeat(&report) {
        Ok(()) => axum::Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    url: String,
    id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetBody {
    id: String,
}

async fn cluster_register(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<RegisterBody>,
) -> impl IntoResponse {
    let command = AdminCommand::AddServer {
        url: body.url.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        let peer = match body.id {
            Some(id) => registry.add_peer_with_id(&id, &body.url, body.description),
            None => registry.add_peer(&body.url, body.description)?,
        };
        Ok(json!({ "status": "ok", "id": peer.id, "url": peer.url }))
    })
}

async fn cluster_remove(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<TargetBody>,
) -> impl IntoResponse {
    let command = AdminCommand::RemoveServer {
        id: body.id.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        registry.remove(&body.id)?;
        Ok(json!({ "status": "ok", "removed": body.id }))
    })
}

async fn cluster_pause(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<TargetBody>,
) -> impl IntoResponse {
    let command = AdminCommand::PauseServer {
        id: body.id.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        registry.pause(&body.id)?;
        Ok(json!({ "status": "ok", "paused": body.id }))
    })
}

async fn cluster_resume(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<TargetBody>,
) -> impl IntoResponse {
    let command = AdminCommand::ResumeServer {
        id: body.id.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        registry.resume(&body.id)?;
        Ok(json!({ "status": "ok", "resumed": body.id }))
    })
}

async fn cluster_stop(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<TargetBody>,
) -> impl IntoResponse {
    let command = AdminCommand::StopServer {
        id: body.id.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        registry.mark_stopped(&body.id)?;
        Ok(json!({ "status": "ok", "stopped": body.id }))
    })
}

async fn cluster_restart(
    State(state): State<ClusterState>,
    axum::Json(body): axum::Json<TargetBody>,
) -> impl IntoResponse {
    let command = AdminCommand::RestartServer {
        id: body.id.clone(),
    };
    let registry = state.election.registry().clone();
    gated(&state, &command, move || {
        // A restarted server re-enters as a fresh follower; its next
        // liveness report flips it back to ACTIVE.
        registry.resume(&body.id)?;
        Ok(json!({ "status": "ok", "restarted": body.id }))
    })
}

async fn health(State(state): State<ClusterState>) -> impl IntoResponse {
    let snapshot = state.election.snapshot();
    axum::Json(json!({
        "status": "healthy",
        "role": snapshot.role,
        "isLeader": state.election.is_leader(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Run a registry mutation under the command gate and translate both
/// rejection and mutation failures to HTTP.
fn gated(
    state: &ClusterState,
    command: &AdminCommand,
    apply: impl FnOnce() -> crate::common::Result<serde_json::Value>,
) -> axum::response::Response {
    match state.gate.execute(command, apply) {
        Ok(Ok(body)) => axum::Json(body).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(rejection) => rejection_response(rejection),
    }
}

fn rejection_response(rejection: CommandRejection) -> axum::response::Response {
    (StatusCode::CONFLICT, axum::Json(json!(rejection))).into_response()
}

fn error_response(e: Error) -> axum::response::Response {
    let status = e.to_http_status();
    (status, axum::Json(json!({ "error": format!("{}", e) }))).into_response()
}
