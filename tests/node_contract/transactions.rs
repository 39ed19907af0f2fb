//! Transaction Tests
//!
//! Tests the transaction contract through the node:
//! - Snapshot visibility before and after commit
//! - First committer wins
//! - Terminal states and double discard
//! - Bounded retry in run_transaction

use crate::common::*;
use serde_json::json;
use std::cell::Cell;
use tessera_core::types::TxnId;
use tessera_core::ErrorKind;
use tessera_engine::resolver::{resolve, CollectionRequest};

fn users() -> CollectionRequest {
    CollectionRequest::by_name("Users")
}

// ============================================================================
// Snapshot isolation
// ============================================================================

#[test]
fn uncommitted_writes_are_invisible() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");

    let writer = begin(&node);
    let reader = node.open_transaction(true).unwrap();
    node.put_document(writer, &users(), "u1", json!({"n": 1}))
        .unwrap();

    // Own writes are visible, others see nothing
    assert_eq!(
        node.get_document(writer, &users(), "u1").unwrap(),
        Some(json!({"n": 1}))
    );
    assert_eq!(node.get_document(reader, &users(), "u1").unwrap(), None);

    node.commit(writer).unwrap();

    // The reader's snapshot predates the commit
    assert_eq!(node.get_document(reader, &users(), "u1").unwrap(), None);

    let late = node.open_transaction(true).unwrap();
    assert_eq!(
        node.get_document(late, &users(), "u1").unwrap(),
        Some(json!({"n": 1}))
    );
}

#[test]
fn first_committer_wins() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let setup = begin(&node);
    node.put_document(setup, &users(), "u1", json!(0)).unwrap();
    node.commit(setup).unwrap();

    let a = begin(&node);
    let b = begin(&node);
    for txn in [a, b] {
        let current = node.get_document(txn, &users(), "u1").unwrap();
        assert_eq!(current, Some(json!(0)));
        node.put_document(txn, &users(), "u1", json!(txn.as_u64()))
            .unwrap();
    }

    node.commit(a).unwrap();
    let err = node.commit(b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains(&b.to_string()));

    // Conflicted stays registered until discarded
    assert_eq!(node.transaction_info(b).unwrap().status, "conflicted");
    assert_eq!(
        node.commit(b).unwrap_err().kind(),
        ErrorKind::InvalidTransactionState
    );
    node.discard(b).unwrap();
}

#[test]
fn blind_writes_do_not_conflict() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");

    let a = begin(&node);
    let b = begin(&node);
    // Resolution reads the catalog without tracking, so both stay blind
    node.put_document(a, &users(), "u1", json!("a")).unwrap();
    node.put_document(b, &users(), "u1", json!("b")).unwrap();
    node.commit(a).unwrap();
    node.commit(b).unwrap();

    let txn = node.open_transaction(true).unwrap();
    assert_eq!(
        node.get_document(txn, &users(), "u1").unwrap(),
        Some(json!("b"))
    );
}

// ============================================================================
// Terminal states
// ============================================================================

#[test]
fn double_discard_fails_without_side_effects() {
    let node = ready_node();
    let txn = begin(&node);
    let version = node.info().current_version;

    node.discard(txn).unwrap();
    let err = node.discard(txn).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransactionState);
    assert!(err.to_string().contains("discarded"));

    assert_eq!(node.info().current_version, version);
    assert_eq!(node.info().live_transactions, 0);
    // The node keeps serving
    let next = begin(&node);
    node.commit(next).unwrap();
}

#[test]
fn commit_after_commit_is_invalid_state() {
    let node = ready_node();
    let txn = begin(&node);
    node.commit(txn).unwrap();
    let err = node.commit(txn).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransactionState);
    assert!(err.to_string().contains("committed"));
}

#[test]
fn unknown_transaction_is_invalid_state() {
    let node = ready_node();
    let err = node.commit(TxnId::new(9_999)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransactionState);
    assert!(err.to_string().contains("unknown"));
}

#[test]
fn read_only_transaction_rejects_writes() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = node.open_transaction(true).unwrap();
    let err = node
        .put_document(txn, &users(), "u1", json!(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn transaction_ids_are_unique_and_non_zero() {
    let node = ready_node();
    let ids: Vec<u64> = (0..50).map(|_| begin(&node).as_u64()).collect();
    assert!(ids.iter().all(|id| *id != 0));
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
}

// ============================================================================
// Bounded retry
// ============================================================================

/// Commit a competing write to `u1` from outside the running transaction.
fn interfere(node: &tessera_engine::Node, value: i64) {
    let other = begin(node);
    node.put_document(other, &users(), "u1", json!(value))
        .unwrap();
    node.commit(other).unwrap();
}

#[test]
fn retry_succeeds_after_transient_conflict() {
    let node = ready_node_with_retries(3);
    seed_collection(&node, "Users", "v1");
    interfere(&node, 0);
    let policy = node.access_policy();
    let calls = Cell::new(0);

    let result = node.run_transaction(false, |txn| {
        calls.set(calls.get() + 1);
        let handle = resolve(txn, &users(), policy.as_ref())?;
        let current = handle.get_document(txn, "u1")?.unwrap_or(json!(0));
        if calls.get() == 1 {
            interfere(&node, 100);
        }
        let next = current.as_i64().unwrap_or(0) + 1;
        handle.put_document(txn, "u1", json!(next))?;
        Ok(next)
    });

    assert_eq!(result.unwrap(), 101);
    assert_eq!(calls.get(), 2);
}

#[test]
fn retry_gives_up_after_bound() {
    let node = ready_node_with_retries(2);
    seed_collection(&node, "Users", "v1");
    interfere(&node, 0);
    let policy = node.access_policy();
    let calls = Cell::new(0);

    let err = node
        .run_transaction(false, |txn| {
            calls.set(calls.get() + 1);
            let handle = resolve(txn, &users(), policy.as_ref())?;
            handle.get_document(txn, "u1")?;
            interfere(&node, calls.get());
            handle.put_document(txn, "u1", json!(-1))?;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("gave up after 3 attempts"));
    assert_eq!(calls.get(), 3);
}

#[test]
fn zero_retries_surfaces_first_conflict() {
    let node = ready_node_with_retries(0);
    seed_collection(&node, "Users", "v1");
    interfere(&node, 0);
    let policy = node.access_policy();
    let calls = Cell::new(0);

    let err = node
        .run_transaction(false, |txn| {
            calls.set(calls.get() + 1);
            let handle = resolve(txn, &users(), policy.as_ref())?;
            handle.get_document(txn, "u1")?;
            interfere(&node, 7);
            handle.put_document(txn, "u1", json!(8))?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(calls.get(), 1);
}

#[test]
fn errors_from_the_body_are_not_retried() {
    let node = ready_node_with_retries(5);
    let policy = node.access_policy();
    let calls = Cell::new(0);

    let err = node
        .run_transaction(false, |txn| {
            calls.set(calls.get() + 1);
            resolve(txn, &CollectionRequest::by_name("Missing"), policy.as_ref())
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(calls.get(), 1);
}
