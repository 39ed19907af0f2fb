//! Boundary Scenario Tests
//!
//! Drives a node purely through `NodeHandle` and `CallResult`, the way an
//! embedding host does.

use tessera_core::CallStatus;
use tesseradb::{NodeHandle, NodeInitOptions};

fn options() -> NodeInitOptions {
    NodeInitOptions {
        disable_p2p: true,
        max_transaction_retries: Some(3),
        ..NodeInitOptions::in_memory()
    }
}

#[test]
fn resolve_discard_resolve() {
    let node = NodeHandle::new();
    let init = node.initialize(options());
    assert_eq!(init.status(), CallStatus::Success);

    let txn: u64 = node.open_transaction(false).decode().unwrap();
    assert!(txn > 0);

    let missing = node.resolve_collection(txn, "v1", "", "Users", "", false);
    assert_eq!(missing.status(), CallStatus::Failure);
    assert!(missing.error().contains("not found"));
    assert!(missing.value().is_empty());

    let discarded = node.discard(txn);
    assert_eq!(discarded.status(), CallStatus::Success);

    let after = node.resolve_collection(txn, "v1", "", "Users", "", false);
    assert_eq!(after.status(), CallStatus::Failure);
    assert!(after.error().contains(&format!("transaction {} is discarded", txn)));
}

#[test]
fn second_initialize_through_boundary_fails() {
    let node = NodeHandle::new();
    assert!(node.initialize(options()).is_success());
    let again = node.initialize(options());
    assert_eq!(again.status(), CallStatus::Failure);
    assert_eq!(again.error(), "node already initialized");
}

#[test]
fn invalid_options_fail_initialize() {
    let node = NodeHandle::new();
    let result = node.initialize(NodeInitOptions {
        max_transaction_retries: Some(-3),
        ..options()
    });
    assert_eq!(result.status(), CallStatus::Failure);
    assert!(result.error().starts_with("validation error"));
}

#[test]
fn collection_lifecycle_through_boundary() {
    let node = NodeHandle::new();
    assert!(node.initialize(options()).is_success());

    let txn: u64 = node.open_transaction(false).decode().unwrap();
    assert!(node.create_collection(txn, "Users", "v1", "").is_success());
    assert!(node.add_collection_version(txn, "Users", "v2", false).is_success());
    assert!(node.set_active_version(txn, "Users", "v2").is_success());
    assert!(node
        .put_document(txn, "Users", "", "", "u1", r#"{"name":"Ada"}"#)
        .is_success());
    let version: u64 = node.commit(txn).decode().unwrap();
    assert_eq!(version, 1);

    let txn: u64 = node.open_transaction(true).decode().unwrap();
    let v1 = node.resolve_collection(txn, "v1", "", "Users", "", false);
    assert!(v1.error().contains("not found"));
    let v1 = node.resolve_collection(txn, "v1", "", "Users", "", true);
    assert!(v1.is_success());

    let doc: serde_json::Value = node
        .get_document(txn, "Users", "v2", "", "u1")
        .decode()
        .unwrap();
    assert_eq!(doc["name"], "Ada");

    let info: serde_json::Value = node.node_info().decode().unwrap();
    assert_eq!(info["state"], "ready");
    assert_eq!(info["current_version"], 1);
    assert_eq!(node.peer_statuses().value(), "[]");

    assert!(node.shutdown().is_success());
    assert!(node.shutdown().is_success());
}
