//! Bootstrap Tests
//!
//! Tests the node lifecycle:
//! - Validation before any stage starts
//! - Stage failure releases started stages
//! - Single initialization
//! - Shutdown makes every call NotReady

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;
use tessera_core::ErrorKind;
use tessera_engine::node::{Node, NodeState, LOCK_FILE_NAME, WAL_FILE_NAME};

// ============================================================================
// Validation
// ============================================================================

#[test]
fn both_storage_modes_is_validation_error() {
    let dir = TempDir::new().unwrap();
    let mut config = persistent_config(&dir);
    config.storage.in_memory = true;

    let node = Node::new();
    let err = node.initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(node.state(), NodeState::Failed);
    assert!(!dir.path().join(WAL_FILE_NAME).exists());
}

#[test]
fn neither_storage_mode_is_validation_error() {
    let mut config = memory_config();
    config.storage.in_memory = false;

    let err = Node::new().initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn malformed_peer_is_validation_error() {
    let mut config = memory_config();
    config.network.p2p_enabled = true;
    config.network.peers = vec!["/ip4/10.0.0.1/udp/9171".into()];

    let err = Node::new().initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("/ip4/10.0.0.1/udp/9171"));
}

#[test]
fn disabled_p2p_ignores_bad_addresses() {
    let mut config = memory_config();
    config.network.listen_addresses = vec!["garbage".into()];
    config.network.peers = vec!["more garbage".into()];

    let node = Node::new();
    node.initialize(config).unwrap();
    assert!(node.peer_statuses().unwrap().is_empty());
}

#[test]
fn bad_key_material_is_validation_error() {
    let mut config = memory_config();
    config.identity.key_type = Some("ed25519".into());
    config.identity.private_key = Some("abcd".into());

    let err = Node::new().initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ============================================================================
// Stage failures
// ============================================================================

#[test]
fn network_failure_releases_storage() {
    let dir = TempDir::new().unwrap();
    let mut config = persistent_config(&dir);
    config.network.p2p_enabled = true;
    config.network.listen_addresses = vec!["/ip4/0.0.0.0/tcp/9171".into()];

    let node = node_with(Arc::new(BrokenListener));
    let err = node.initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bootstrap);
    assert!(err.to_string().contains("bootstrap stage 'network' failed"));
    assert!(err.to_string().contains("address already in use"));
    assert_eq!(node.state(), NodeState::Failed);
    assert!(dir.path().join(LOCK_FILE_NAME).exists());

    // Storage was released: another node can take the directory
    let other = Node::new();
    other.initialize(persistent_config(&dir)).unwrap();
    assert_eq!(other.state(), NodeState::Ready);
}

#[test]
fn storage_failure_is_reported_and_retryable() {
    let dir = TempDir::new().unwrap();
    let holder = Node::new();
    holder.initialize(persistent_config(&dir)).unwrap();

    let node = Node::new();
    let err = node.initialize(persistent_config(&dir)).unwrap_err();
    assert!(err.to_string().contains("bootstrap stage 'storage' failed"));
    assert!(err.to_string().contains("already in use"));

    holder.shutdown().unwrap();
    node.initialize(persistent_config(&dir)).unwrap();
    assert_eq!(node.state(), NodeState::Ready);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn second_initialize_is_already_initialized() {
    let node = ready_node();
    let err = node.initialize(memory_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);

    // The running node is untouched
    let txn = begin(&node);
    node.commit(txn).unwrap();
}

#[test]
fn every_call_after_shutdown_is_not_ready() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    node.shutdown().unwrap();

    assert_eq!(node.state(), NodeState::Stopped);
    for err in [
        node.open_transaction(false).unwrap_err(),
        node.commit(txn).unwrap_err(),
        node.discard(txn).unwrap_err(),
        node.list_collections(txn, true).unwrap_err(),
        node.peer_statuses().unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }
}

#[test]
fn shutdown_before_initialize_is_not_ready() {
    let node = Node::new();
    assert_eq!(node.shutdown().unwrap_err().kind(), ErrorKind::NotReady);
}

#[test]
fn committed_data_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let node = Node::new();
        node.initialize(persistent_config(&dir)).unwrap();
        seed_collection(&node, "Users", "v1");
        seed_collection(&node, "Orders", "v1");
        node.shutdown().unwrap();
    }

    let node = Node::new();
    node.initialize(persistent_config(&dir)).unwrap();
    assert_eq!(node.info().current_version, 2);
    let txn = node.open_transaction(true).unwrap();
    let names: Vec<_> = node
        .list_collections(txn, false)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Orders", "Users"]);
}
