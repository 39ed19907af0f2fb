//! Resolution Tests
//!
//! Tests the collection-resolution rules:
//! - Id precedence over name
//! - Exact version matching
//! - Inactive versions
//! - Identity checks, grants and ambiguity
//! - Resolution without read-set entries

use crate::common::*;
use serde_json::json;
use tessera_core::types::{Identity, VersionId};
use tessera_core::ErrorKind;
use tessera_engine::access::AccessRule;
use tessera_engine::resolver::CollectionRequest;

fn v(tag: &str) -> VersionId {
    VersionId::new(tag)
}

#[test]
fn id_takes_precedence_over_name() {
    let node = ready_node();
    let txn = begin(&node);
    let users = node.create_collection(txn, "Users", &v("v1"), None).unwrap();
    node.create_collection(txn, "Orders", &v("v1"), None).unwrap();

    let mut request = CollectionRequest::by_id(users.id.clone());
    request.name = Some("Orders".into());
    let handle = node.resolve_collection(txn, &request).unwrap();
    assert_eq!(handle.description.name, "Users");
    assert_eq!(handle.txn_id, txn);
}

#[test]
fn version_tag_must_match_exactly() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);

    let err = node
        .resolve_collection(txn, &CollectionRequest::by_name("Users").with_version(v("V1")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let handle = node
        .resolve_collection(txn, &CollectionRequest::by_name("Users").with_version(v("v1")))
        .unwrap();
    assert_eq!(handle.description.version_id, v("v1"));
}

#[test]
fn inactive_version_is_not_found_unless_requested() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    node.add_collection_version(txn, "Users", &v("v2"), true)
        .unwrap();
    node.commit(txn).unwrap();

    let txn = begin(&node);
    let old = CollectionRequest::by_name("Users").with_version(v("v1"));
    let err = node.resolve_collection(txn, &old).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let handle = node
        .resolve_collection(txn, &old.clone().include_inactive(true))
        .unwrap();
    assert!(!handle.description.active);

    // Without a tag the single active version is chosen
    let current = node
        .resolve_collection(txn, &CollectionRequest::by_name("Users"))
        .unwrap();
    assert_eq!(current.description.version_id, v("v2"));
}

#[test]
fn several_versions_without_tag_is_ambiguous() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    node.add_collection_version(txn, "Users", &v("v2"), false)
        .unwrap();

    let request = CollectionRequest::by_name("Users").include_inactive(true);
    let err = node.resolve_collection(txn, &request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousLookup);
    assert!(err.to_string().contains("2 versions"));
}

#[test]
fn denied_identity_is_authorization_not_not_found() {
    let node = ready_node();
    let txn = begin(&node);
    node.create_collection(
        txn,
        "Private",
        &v("v1"),
        Some(AccessRule::owner(Identity::new("alice"))),
    )
    .unwrap();

    let as_bob = CollectionRequest::by_name("Private").with_identity(Identity::new("bob"));
    let err = node.resolve_collection(txn, &as_bob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(err.to_string().contains("bob"));

    let as_alice = CollectionRequest::by_name("Private").with_identity(Identity::new("alice"));
    assert!(node.resolve_collection(txn, &as_alice).is_ok());

    let missing = CollectionRequest::by_name("Nope").with_identity(Identity::new("bob"));
    assert_eq!(
        node.resolve_collection(txn, &missing).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn anonymous_caller_cannot_use_owned_collection() {
    let node = ready_node();
    let txn = begin(&node);
    node.create_collection(
        txn,
        "Secrets",
        &v("v1"),
        Some(AccessRule::owner(Identity::new("alice"))),
    )
    .unwrap();

    let anonymous = CollectionRequest::by_name("Secrets");
    let err = node.resolve_collection(txn, &anonymous).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = node
        .put_document(txn, &anonymous, "s1", json!({"pin": 1234}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let as_alice = anonymous.clone().with_identity(Identity::new("alice"));
    assert!(node.list_document_ids(txn, &as_alice).unwrap().is_empty());
}

#[test]
fn owner_grants_and_revokes_access() {
    let node = ready_node();
    let alice = Identity::new("alice");
    let bob = Identity::new("bob");
    let txn = begin(&node);
    node.create_collection(txn, "Shared", &v("v1"), Some(AccessRule::owner(alice.clone())))
        .unwrap();
    node.grant_access(txn, "Shared", Some(&alice), bob.clone()).unwrap();
    node.commit(txn).unwrap();

    let as_bob = CollectionRequest::by_name("Shared").with_identity(bob.clone());
    let txn = begin(&node);
    node.put_document(txn, &as_bob, "b1", json!(1)).unwrap();
    let err = node
        .revoke_access(txn, "Shared", Some(&bob), &bob)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    node.revoke_access(txn, "Shared", Some(&alice), &bob).unwrap();
    node.commit(txn).unwrap();

    let txn = begin(&node);
    assert_eq!(
        node.get_document(txn, &as_bob, "b1").unwrap_err().kind(),
        ErrorKind::Authorization
    );
}

#[test]
fn neither_id_nor_name_is_validation() {
    let node = ready_node();
    let txn = begin(&node);
    let err = node
        .resolve_collection(txn, &CollectionRequest::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn resolution_does_not_record_reads() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    node.resolve_collection(txn, &CollectionRequest::by_name("Users"))
        .unwrap();
    assert_eq!(node.transaction_info(txn).unwrap().reads, 0);
}

#[test]
fn resolution_in_finished_transaction_is_invalid_state() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    node.discard(txn).unwrap();
    let err = node
        .resolve_collection(txn, &CollectionRequest::by_name("Users"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransactionState);
}

#[test]
fn collection_created_in_transaction_is_visible_to_it_only() {
    let node = ready_node();
    let creator = begin(&node);
    let other = begin(&node);
    node.create_collection(creator, "Drafts", &v("v1"), None)
        .unwrap();
    node.put_document(creator, &CollectionRequest::by_name("Drafts"), "d1", json!({}))
        .unwrap();

    assert!(node
        .resolve_collection(creator, &CollectionRequest::by_name("Drafts"))
        .is_ok());
    assert_eq!(
        node.resolve_collection(other, &CollectionRequest::by_name("Drafts"))
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn documents_follow_the_active_version() {
    let node = ready_node();
    seed_collection(&node, "Users", "v1");
    let txn = begin(&node);
    let users = CollectionRequest::by_name("Users");
    node.put_document(txn, &users, "u1", json!("in v1")).unwrap();
    node.add_collection_version(txn, "Users", &v("v2"), true)
        .unwrap();
    node.put_document(txn, &users, "u1", json!("in v2")).unwrap();
    node.commit(txn).unwrap();

    let txn = begin(&node);
    assert_eq!(
        node.list_document_ids(txn, &users).unwrap(),
        vec!["u1".to_string()]
    );
    let v1 = CollectionRequest::by_name("Users")
        .with_version(v("v1"))
        .include_inactive(true);
    assert_eq!(
        node.get_document(txn, &v1, "u1").unwrap(),
        Some(json!("in v1"))
    );
    assert!(node.delete_document(txn, &users, "u1").unwrap());
    assert!(!node.delete_document(txn, &users, "u1").unwrap());

    node.set_active_version(txn, "Users", &v("v1")).unwrap();
    assert_eq!(
        node.get_document(txn, &users, "u1").unwrap(),
        Some(json!("in v1"))
    );
}
