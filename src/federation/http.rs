//! HTTP API for a federated coordinator
//!
//! Carries the federated-tier consensus RPCs, the upward-facing
//! registration/heartbeat endpoints for managed nodes, and the federated
//! admin surface. Mutating admin routes are double-gated: they check
//! federated leadership, never the leadership of any nested group.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::cluster::{AdminCommand, CommandGate, CommandRejection, ElectionNode};
use crate::common::{Error, HeartbeatRequest, PeerReport, VoteRequest};

use super::supervisor::FederationSupervisor;

#[derive(Clone)]
pub struct FederationState {
    pub supervisor: Arc<FederationSupervisor>,
    pub gate: Arc<CommandGate<ElectionNode>>,
}

impl FederationState {
    pub fn new(supervisor: Arc<FederationSupervisor>) -> Self {
        let gate = Arc::new(CommandGate::new(supervisor.election().clone()));
        Self { supervisor, gate }
    }
}

pub fn create_router(state: FederationState) -> Router {
    Router::new()
        // Federated-tier consensus RPCs
        .route("/federated/raft/vote", axum::routing::post(raft_vote))
        .route(
            "/federated/raft/heartbeat",
            axum::routing::post(raft_heartbeat),
        )
        .route("/federated/raft/addPeer", axum::routing::post(raft_add_peer))
        .route(
            "/federated/raft/removePeer",
            axum::routing::post(raft_remove_peer),
        )
        // Managed DB-node group
        .route("/federated/status", axum::routing::get(status))
        .route("/federated/register", axum::routing::post(register))
        .route("/federated/heartbeat", axum::routing::post(heartbeat))
        .route("/federated/node-leader", axum::routing::get(node_leader))
        .route("/federated/node/stop/:id", axum::routing::post(node_stop))
        .route(
            "/federated/node/restart/:id",
            axum::routing::post(node_restart),
        )
        .route(
            "/federated/node/remove/:id",
            axum::routing::post(node_remove),
        )
        // Managed memory-node group
        .route(
            "/federated/memory/register",
            axum::routing::post(memory_register),
        )
        .route(
            "/federated/memory/heartbeat",
            axum::routing::post(memory_heartbeat),
        )
        .route("/federated/memory/leader", axum::routing::get(memory_leader))
        .route("/health", axum::routing::get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn raft_vote(
    State(state): State<FederationState>,
    axum::Json(req): axum::Json<VoteRequest>,
) -> impl IntoResponse {
    axum::Json(state.supervisor.election().handle_vote_request(&req))
}

async fn raft_heartbeat(
    State(state): State<FederationState>,
    axum::Json(req): axum::Json<HeartbeatRequest>,
) -> impl IntoResponse {
    axum::Json(state.supervisor.election().handle_heartbeat(&req))
}

#[derive(Debug, Deserialize)]
struct AddPeerBody {
    url: String,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemovePeerBody {
    id: String,
}

async fn raft_add_peer(
    State(state): State<FederationState>,
    axum::Json(body): axum::Json<AddPeerBody>,
) -> impl IntoResponse {
    let command = AdminCommand::AddServer {
        url: body.url.clone(),
    };
    let registry = state.supervisor.election().registry().clone();
    match state.gate.execute(&command, move || {
        let peer = match body.id {
            Some(id) => registry.add_peer_with_id(&id, &body.url, None),
            None => registry.add_peer(&body.url, None)?,
        };
        Ok(json!({ "status": "ok", "id": peer.id, "url": peer.url }))
    }) {
        Ok(Ok(body)) => axum::Json(body).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn raft_remove_peer(
    State(state): State<FederationState>,
    axum::Json(body): axum::Json<RemovePeerBody>,
) -> impl IntoResponse {
    let command = AdminCommand::RemoveServer {
        id: body.id.clone(),
    };
    let registry = state.supervisor.election().registry().clone();
    match state.gate.execute(&command, move || {
        registry.remove(&body.id)?;
        Ok(json!({ "status": "ok", "removed": body.id }))
    }) {
        Ok(Ok(body)) => axum::Json(body).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(rejection) => rejection_response(rejection),
    }
}

/// Federated status document: the coordinator's own consensus state plus
/// the derived view of every managed group.
async fn status(State(state): State<FederationState>) -> impl IntoResponse {
    let supervisor = &state.supervisor;
    let election = supervisor.election();
    let registry = election.registry();
    let snapshot = election.snapshot();
    let quorum = registry.quorum();
    let peers = registry.snapshot();
    let peer_urls: Vec<&str> = peers.iter().map(|p| p.url.as_str()).collect();
    let peer_ids: Vec<&str> = peers.iter().map(|p| p.id.as_str()).collect();
    let peer_states: serde_json::Map<String, serde_json::Value> = peers
        .iter()
        .map(|p| (p.id.clone(), json!({ "role": p.role, "status": p.status })))
        .collect();
    let (db_leader_id, _) = supervisor.db_leader_view();

    axum::Json(json!({
        "leaderId": db_leader_id,
        "isFederatedLeader": supervisor.is_federated_leader(),
        "nodes": supervisor.db_nodes(),
        "memoryNodes": supervisor.memory_nodes(),
        "memoryLeaderId": supervisor.memory_leader(),
        "raftState": snapshot.role,
        "raftTerm": snapshot.term,
        "raftLeaderId": snapshot.leader_id,
        "raftLeaderUrl": snapshot.leader_url,
        "raftSelfId": election.self_id(),
        "raftPeers": peer_urls,
        "raftPeerIds": peer_ids,
        "raftPeerStates": peer_states,
        "quorum": {
            "required": quorum.required,
            "active": quorum.active,
            "hasQuorum": quorum.has_quorum,
        },
    }))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    id: String,
    url: String,
}

async fn register(
    State(state): State<FederationState>,
    axum::Json(body): axum::Json<RegisterBody>,
) -> impl IntoResponse {
    state.supervisor.register_node(&body.id, &body.url);
    axum::Json(json!({ "status": "ok" }))
}

async fn heartbeat(
    State(state): State<FederationState>,
    axum::Json(report): axum::Json<PeerReport>,
) -> impl IntoResponse {
    match state.supervisor.heartbeat(&report).await {
        Ok(ack) => axum::Json(json!(ack)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn node_leader(State(state): State<FederationState>) -> impl IntoResponse {
    let (id, url) = state.supervisor.db_leader_view();
    axum::Json(json!({ "dbLeaderId": id, "dbLeaderUrl": url }))
}

async fn node_stop(
    State(state): State<FederationState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let command = AdminCommand::StopServer { id: id.clone() };
    if let Err(rejection) = state.gate.authorize(&command) {
        return rejection_response(rejection);
    }
    match state.supervisor.stop_node(&id).await {
        Ok(()) => match state.gate.authorize(&command) {
            Ok(()) => axum::Json(json!({ "status": "ok", "stopped": id })).into_response(),
            Err(rejection) => rejection_response(rejection),
        },
        Err(e) => error_response(e),
    }
}

async fn node_restart(
    State(state): State<FederationState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let command = AdminCommand::RestartServer { id: id.clone() };
    if let Err(rejection) = state.gate.authorize(&command) {
        return rejection_response(rejection);
    }
    match state.supervisor.restart_node(&id) {
        Ok(()) => axum::Json(json!({ "status": "ok", "restarted": id })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn node_remove(
    State(state): State<FederationState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let command = AdminCommand::RemoveServer { id: id.clone() };
    if let Err(rejection) = state.gate.authorize(&command) {
        return rejection_response(rejection);
    }
    match state.supervisor.remove_node(&id).await {
        Ok(()) => axum::Json(json!({ "status": "ok", "removed": id })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn memory_register(
    State(state): State<FederationState>,
    axum::Json(body): axum::Json<RegisterBody>,
) -> impl IntoResponse {
    state.supervisor.register_memory_node(&body.id, &body.url);
    axum::Json(json!({ "status": "ok" }))
}

async fn memory_heartbeat(
    State(state): State<FederationState>,
    axum::Json(report): axum::Json<PeerReport>,
) -> impl IntoResponse {
    match state.supervisor.memory_heartbeat(&report) {
        Ok(()) => axum::Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn memory_leader(State(state): State<FederationState>) -> impl IntoResponse {
    axum::Json(json!({ "memoryLeaderId": state.supervisor.memory_leader() }))
}

async fn health(State(state): State<FederationState>) -> impl IntoResponse {
    let snapshot = state.supervisor.election().snapshot();
    axum::Json(json!({
        "status": "healthy",
        "role": snapshot.role,
        "isFederatedLeader": state.supervisor.is_federated_leader(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn rejection_response(rejection: CommandRejection) -> axum::response::Response {
    (StatusCode::CONFLICT, axum::Json(json!(rejection))).into_response()
}

fn error_response(e: Error) -> axum::response::Response {
    let status = e.to_http_status();
    (status, axum::Json(json!({ "error": format!("{}", e) }))).into_response()
}
