//! Federation supervision: DB-leader assignment, double gating, memory tier

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::build_group;
use fedraft::cluster::{AdminCommand, CommandGate, PeerStatus};
use fedraft::common::{Clock, Error, ManualClock, PeerReport, Result};
use fedraft::federation::{FederationSupervisor, PromoteClient};

fn report(id: &str, timestamp: u64) -> PeerReport {
    PeerReport {
        peer_id: id.to_string(),
        cpu_usage: 12.0,
        ram_used: 1_000,
        ram_total: 4_000,
        disk_used: 5,
        disk_total: 100,
        latency_ms: 1,
        timestamp,
    }
}

/// Records promote deliveries instead of making HTTP calls.
struct FakePromoter {
    delivered: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl FakePromoter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        })
    }

    fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn deliveries(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromoteClient for FakePromoter {
    async fn promote(&self, url: &str) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(Error::ConnectionFailed(url.to_string()));
        }
        self.delivered.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn supervisor_led_by_self(
    clock: &Arc<ManualClock>,
    promoter: Arc<FakePromoter>,
) -> Arc<FederationSupervisor> {
    let (_mesh, nodes) = build_group(1, clock);
    nodes[0].promote();
    FederationSupervisor::new(
        nodes[0].clone(),
        clock.clone() as Arc<dyn Clock>,
        common::STALE_THRESHOLD_MS,
        promoter,
    )
}

#[tokio::test]
async fn heartbeat_assignment_picks_first_active_node() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    supervisor.register_node("db2", "http://db2");
    supervisor.register_node("db1", "http://db1");

    let ack = supervisor.heartbeat(&report("db2", 0)).await.unwrap();
    // db1 sorts first and is just as fresh as db2 (registration stamps it).
    assert_eq!(ack.db_leader_id.as_deref(), Some("db1"));
    assert_eq!(ack.db_leader_url.as_deref(), Some("http://db1"));
    assert_eq!(promoter.deliveries(), vec!["http://db1".to_string()]);
}

#[tokio::test]
async fn failed_promote_delivery_leaves_the_group_leaderless() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());
    promoter.set_failing(true);

    supervisor.register_node("db1", "http://db1");
    let ack = supervisor.heartbeat(&report("db1", 0)).await.unwrap();
    assert_eq!(ack.db_leader_id, None);

    // Delivery recovers; the reconcile pass assigns on its next run.
    promoter.set_failing(false);
    supervisor.reconcile().await;
    assert_eq!(supervisor.db_leader().as_deref(), Some("db1"));
}

#[tokio::test]
async fn stale_leader_is_replaced_by_the_health_sweep() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    supervisor.register_node("db1", "http://db1");
    supervisor.register_node("db2", "http://db2");
    supervisor.heartbeat(&report("db1", 0)).await.unwrap();
    assert_eq!(supervisor.db_leader().as_deref(), Some("db1"));

    // db1 goes silent; db2 keeps reporting.
    clock.advance(8_000);
    supervisor.heartbeat(&report("db2", 8_000)).await.unwrap();
    clock.advance(4_000);
    supervisor.health_sweep().await;

    assert_eq!(supervisor.db_leader().as_deref(), Some("db2"));
    assert_eq!(
        promoter.deliveries(),
        vec!["http://db1".to_string(), "http://db2".to_string()]
    );
}

#[tokio::test]
async fn fully_dead_group_stays_leaderless() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    supervisor.register_node("db1", "http://db1");
    supervisor.heartbeat(&report("db1", 0)).await.unwrap();
    assert_eq!(supervisor.db_leader().as_deref(), Some("db1"));

    clock.advance(30_000);
    supervisor.health_sweep().await;
    assert_eq!(supervisor.db_leader(), None);

    // A leader is never fabricated while everything is stale.
    supervisor.reconcile().await;
    assert_eq!(supervisor.db_leader(), None);
    assert_eq!(promoter.deliveries().len(), 1);
}

#[tokio::test]
async fn heartbeat_from_unknown_node_is_refused() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    let err = supervisor.heartbeat(&report("ghost", 0)).await.unwrap_err();
    assert!(matches!(err, Error::UnknownPeer(_)));
    assert!(supervisor.db_nodes().is_empty());
}

#[tokio::test]
async fn non_leader_coordinator_never_assigns() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    // 3 federated coordinators, this one stays follower.
    let (_mesh, nodes) = build_group(3, &clock);
    let supervisor = FederationSupervisor::new(
        nodes[0].clone(),
        clock.clone() as Arc<dyn Clock>,
        common::STALE_THRESHOLD_MS,
        promoter.clone(),
    );

    supervisor.register_node("db1", "http://db1");
    let ack = supervisor.heartbeat(&report("db1", 0)).await.unwrap();
    assert_eq!(ack.db_leader_id, None);
    supervisor.reconcile().await;
    assert!(promoter.deliveries().is_empty());
}

#[tokio::test]
async fn federated_follower_rejects_nested_commands_with_federated_leader() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    // node1 leads the federated tier and tells the others.
    nodes[0].promote();
    common::heartbeat_round(&nodes[0], &clock).await;

    // The follower coordinator node2 is meanwhile a legitimate Raft leader
    // of its own nested 3-node DB group.
    let (_db_mesh, db_nodes) = build_group(3, &clock);
    common::advance_past_timeout(&clock);
    db_nodes[0].tick().await;
    assert!(db_nodes[0].is_leader());
    let local_gate = CommandGate::new(db_nodes[0].clone());
    let local_cmd = AdminCommand::PauseServer {
        id: "node3".to_string(),
    };
    assert!(local_gate.authorize(&local_cmd).is_ok());

    // Gate on the follower coordinator: the rejection points at the
    // federated leader, even though that coordinator leads its own DB group.
    let gate = CommandGate::new(nodes[1].clone());
    let cmd = AdminCommand::StopServer {
        id: "db1".to_string(),
    };
    let rejection = gate.authorize(&cmd).unwrap_err();
    assert_eq!(rejection.reason, "NOT_LEADER");
    assert_eq!(rejection.current_leader_id.as_deref(), Some("node1"));
    assert_eq!(
        rejection.current_leader_url.as_deref(),
        Some("http://node1")
    );

    // The federated leader itself passes the same gate.
    let leader_gate = CommandGate::new(nodes[0].clone());
    assert!(leader_gate.authorize(&cmd).is_ok());
}

#[tokio::test]
async fn stopping_the_db_leader_hands_leadership_to_the_next_node() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    supervisor.register_node("db1", "http://db1");
    supervisor.register_node("db2", "http://db2");
    supervisor.heartbeat(&report("db1", 0)).await.unwrap();
    assert_eq!(supervisor.db_leader().as_deref(), Some("db1"));

    supervisor.stop_node("db1").await.unwrap();
    assert_eq!(supervisor.db_leader().as_deref(), Some("db2"));
    let db1 = supervisor
        .db_nodes()
        .into_iter()
        .find(|n| n.id == "db1")
        .unwrap();
    assert_eq!(db1.status, PeerStatus::Inactive);

    // Restart clears the stop mark; the node turns active again on its
    // next report.
    supervisor.restart_node("db1").unwrap();
    supervisor.heartbeat(&report("db1", 100)).await.unwrap();
    let db1 = supervisor
        .db_nodes()
        .into_iter()
        .find(|n| n.id == "db1")
        .unwrap();
    assert_eq!(db1.status, PeerStatus::Active);
    // db2 keeps the leadership it was handed.
    assert_eq!(supervisor.db_leader().as_deref(), Some("db2"));
}

#[tokio::test]
async fn memory_leader_prefers_local_nodes() {
    let clock = Arc::new(ManualClock::new(0));
    let promoter = FakePromoter::new();
    let supervisor = supervisor_led_by_self(&clock, promoter.clone());

    supervisor.register_memory_node("mem-a", "http://remote-host:8500");
    supervisor.register_memory_node("mem-b", "http://localhost:8500");
    supervisor.memory_heartbeat(&report("mem-a", 0)).unwrap();
    supervisor.memory_heartbeat(&report("mem-b", 0)).unwrap();

    // mem-a sorts first by id, but mem-b is local and wins.
    assert_eq!(supervisor.memory_leader().as_deref(), Some("mem-b"));

    clock.advance(20_000);
    supervisor.memory_heartbeat(&report("mem-a", 20_000)).unwrap();
    supervisor.health_sweep().await;
    assert_eq!(supervisor.memory_leader().as_deref(), Some("mem-a"));
}
