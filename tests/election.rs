//! Election behavior: leader uniqueness, vote safety, candidate backoff

mod common;

use std::sync::Arc;

use common::{advance_past_timeout, build_group, heartbeat_round, leaders};
use fedraft::cluster::Role;
use fedraft::common::{HeartbeatRequest, ManualClock, VoteRequest};

#[tokio::test]
async fn first_timed_out_follower_wins_the_election() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    advance_past_timeout(&clock);
    nodes[0].tick().await;

    assert!(nodes[0].is_leader());
    assert_eq!(nodes[0].current_term(), 1);
    assert_eq!(leaders(&nodes), vec!["node1".to_string()]);

    // Peers adopted the new term and know who leads.
    heartbeat_round(&nodes[0], &clock).await;
    assert_eq!(nodes[1].current_term(), 1);
    assert_eq!(nodes[1].leader_id().as_deref(), Some("node1"));
    assert_eq!(nodes[2].leader_id().as_deref(), Some("node1"));
}

#[tokio::test]
async fn at_most_one_vote_per_term() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    let req = VoteRequest {
        term: 5,
        candidate_id: "node2".to_string(),
    };
    let first = nodes[2].handle_vote_request(&req);
    assert!(first.vote_granted);
    assert_eq!(first.term, 5);

    // Duplicate request from the same candidate gets the same answer.
    let again = nodes[2].handle_vote_request(&req);
    assert!(again.vote_granted);

    // A competing candidate in the same term is refused.
    let competing = nodes[2].handle_vote_request(&VoteRequest {
        term: 5,
        candidate_id: "node1".to_string(),
    });
    assert!(!competing.vote_granted);
    assert_eq!(competing.term, 5);
}

#[tokio::test]
async fn stale_term_vote_request_is_denied_not_errored() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    nodes[2].handle_vote_request(&VoteRequest {
        term: 5,
        candidate_id: "node2".to_string(),
    });
    let stale = nodes[2].handle_vote_request(&VoteRequest {
        term: 3,
        candidate_id: "node1".to_string(),
    });
    assert!(!stale.vote_granted);
    assert_eq!(stale.term, 5);
}

#[tokio::test]
async fn vote_request_from_unknown_node_is_ignored() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    let resp = nodes[0].handle_vote_request(&VoteRequest {
        term: 9,
        candidate_id: "intruder".to_string(),
    });
    assert!(!resp.vote_granted);
    assert_eq!(nodes[0].current_term(), 0);
}

#[tokio::test]
async fn candidate_times_out_and_backs_off_to_follower() {
    let clock = Arc::new(ManualClock::new(0));
    let (mesh, nodes) = build_group(3, &clock);

    // Isolate node2 so its election cannot gather a majority.
    mesh.partition(&[&["http://node2"], &["http://node1", "http://node3"]]);
    advance_past_timeout(&clock);
    nodes[1].tick().await;
    assert_eq!(nodes[1].snapshot().role, Role::Candidate);
    assert_eq!(nodes[1].current_term(), 1);

    // The election round expires without a majority.
    advance_past_timeout(&clock);
    nodes[1].tick().await;
    assert_eq!(nodes[1].snapshot().role, Role::Follower);
    // The bumped term is kept, it never rolls back.
    assert_eq!(nodes[1].current_term(), 1);
}

#[tokio::test]
async fn candidate_defers_to_leader_of_equal_term() {
    let clock = Arc::new(ManualClock::new(0));
    let (mesh, nodes) = build_group(3, &clock);

    mesh.partition(&[&["http://node2"], &["http://node1", "http://node3"]]);
    advance_past_timeout(&clock);
    nodes[1].tick().await;
    assert_eq!(nodes[1].snapshot().role, Role::Candidate);

    mesh.heal();
    let resp = nodes[1].handle_heartbeat(&HeartbeatRequest {
        term: nodes[1].current_term(),
        leader_id: "node1".to_string(),
    });
    assert!(resp.success);
    assert_eq!(nodes[1].snapshot().role, Role::Follower);
    assert_eq!(nodes[1].leader_id().as_deref(), Some("node1"));
}

#[tokio::test]
async fn leader_abdicates_only_on_strictly_higher_term() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    advance_past_timeout(&clock);
    nodes[0].tick().await;
    assert!(nodes[0].is_leader());
    let term = nodes[0].current_term();

    // Equal-term claim from someone else changes nothing.
    let equal = nodes[0].handle_heartbeat(&HeartbeatRequest {
        term,
        leader_id: "node2".to_string(),
    });
    assert!(!equal.success);
    assert!(nodes[0].is_leader());

    // A strictly higher term forces the step-down.
    let higher = nodes[0].handle_heartbeat(&HeartbeatRequest {
        term: term + 1,
        leader_id: "node2".to_string(),
    });
    assert!(higher.success);
    assert!(!nodes[0].is_leader());
    assert_eq!(nodes[0].current_term(), term + 1);
    assert_eq!(nodes[0].leader_id().as_deref(), Some("node2"));
}

#[tokio::test]
async fn single_node_group_leads_itself() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(1, &clock);

    advance_past_timeout(&clock);
    nodes[0].tick().await;
    assert!(nodes[0].is_leader());
    assert_eq!(nodes[0].current_term(), 1);
    assert_eq!(nodes[0].leader_id().as_deref(), Some("node1"));
}

#[tokio::test]
async fn promotion_takes_leadership_without_a_vote() {
    let clock = Arc::new(ManualClock::new(0));
    let (_mesh, nodes) = build_group(3, &clock);

    nodes[2].promote();
    assert!(nodes[2].is_leader());
    assert_eq!(leaders(&nodes), vec!["node3".to_string()]);

    // Peers learn of the promoted leader through its heartbeats.
    heartbeat_round(&nodes[2], &clock).await;
    assert_eq!(nodes[0].leader_id().as_deref(), Some("node3"));
}
