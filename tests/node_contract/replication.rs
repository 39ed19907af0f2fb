//! Replication Tests
//!
//! Tests the peer reconnect scheduler as wired into a node:
//! - Failed peers keep retrying on the configured schedule
//! - Connected peers report their state
//! - Shutdown stops every pending attempt
//! - Peers added at runtime are dialled; removed peers are not
//!
//! These run against the node's own runtime, so they use real time with
//! one-second intervals.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tessera_engine::replication::PeerState;

fn p2p_config(peers: &[&str]) -> tessera_engine::NodeInitConfig {
    let mut config = memory_config();
    config.network.p2p_enabled = true;
    config.network.peers = peers.iter().map(|p| p.to_string()).collect();
    config.network.retry_intervals_secs = vec![1];
    config
}

#[test]
fn unreachable_peer_is_retried_until_shutdown() {
    let connector = Arc::new(RefusingConnector::default());
    let node = node_with(connector.clone());
    node.initialize(p2p_config(&["/ip4/10.0.0.2/tcp/9171"])).unwrap();

    thread::sleep(Duration::from_millis(2_500));
    let seen = connector.attempts();
    assert!(seen >= 2, "expected retries, saw {}", seen);

    let statuses = node.peer_statuses().unwrap();
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert_eq!(status.address, "/ip4/10.0.0.2/tcp/9171");
    assert!(status.consecutive_failures >= 1);
    assert_eq!(status.last_error.as_deref(), Some("connection refused"));

    node.shutdown().unwrap();
    let at_shutdown = connector.attempts();
    thread::sleep(Duration::from_millis(1_500));
    assert_eq!(connector.attempts(), at_shutdown);
}

#[test]
fn reachable_peers_report_connected() {
    let node = node_with(Arc::new(AcceptingConnector));
    node.initialize(p2p_config(&["127.0.0.1:9171", "/dns4/peer.local/tcp/9172"]))
        .unwrap();

    let mut connected = false;
    for _ in 0..50 {
        let statuses = node.peer_statuses().unwrap();
        if statuses.iter().all(|s| s.state == PeerState::Connected) {
            connected = true;
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(connected);
    assert_eq!(node.info().peers, 2);
}

#[test]
fn boundary_calls_do_not_wait_for_peers() {
    let connector = Arc::new(RefusingConnector::default());
    let node = node_with(connector);
    node.initialize(p2p_config(&["/ip4/10.0.0.3/tcp/9171"])).unwrap();

    seed_collection(&node, "Users", "v1");
    assert_eq!(node.info().current_version, 1);
}

#[test]
fn peers_added_at_runtime_are_dialled_until_removed() {
    let connector = Arc::new(RefusingConnector::default());
    let node = node_with(connector.clone());
    node.initialize(p2p_config(&[])).unwrap();
    assert!(node.peer_statuses().unwrap().is_empty());

    assert!(node.add_peer("/ip4/10.0.0.4/tcp/9171").unwrap());
    thread::sleep(Duration::from_millis(1_500));
    assert!(connector.attempts() >= 2);
    assert_eq!(node.peer_statuses().unwrap()[0].address, "/ip4/10.0.0.4/tcp/9171");

    assert!(node.remove_peer("/ip4/10.0.0.4/tcp/9171").unwrap());
    assert!(node.peer_statuses().unwrap().is_empty());
    let at_removal = connector.attempts();
    thread::sleep(Duration::from_millis(1_500));
    assert_eq!(connector.attempts(), at_removal);
    node.shutdown().unwrap();
}
