//! Tessera - embeddable node for a peer-to-peer transactional document store
//!
//! A node keeps versioned collections of JSON documents, serves snapshot-
//! isolated transactions with optimistic conflict detection, and keeps
//! reconnecting to its configured peers with a capped backoff.
//!
//! # Quick Start
//!
//! ```ignore
//! use tesseradb::{NodeHandle, NodeInitOptions};
//!
//! let node = NodeHandle::new();
//! assert!(node.initialize(NodeInitOptions::in_memory()).is_success());
//!
//! let txn: u64 = node.open_transaction(false).decode()?;
//! node.create_collection(txn, "Users", "v1", "");
//! node.put_document(txn, "Users", "", "", "u1", r#"{"name":"Ada"}"#);
//! node.commit(txn);
//! ```
//!
//! # Architecture
//!
//! Hosts talk to a node through the boundary layer ([`NodeHandle`],
//! [`Dispatcher`]), which returns a [`CallResult`] for every call. Rust
//! embedders can use [`Node`] directly for typed results.

pub use tessera_api::*;
pub use tessera_core::{CallResult, CallStatus, ErrorKind, TesseraError, TesseraResult};
pub use tessera_engine::{
    AccessPolicy, AccessRule, CollectionDescription, CollectionRequest, Node, NodeComponents,
    NodeInfo, NodeInitConfig, NodeState, PeerConnector, PeerState, RuleBasedPolicy,
};
