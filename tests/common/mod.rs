//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tessera_core::types::{TxnId, VersionId};
use tessera_engine::config::NodeInitConfig;
use tessera_engine::node::{Node, NodeComponents};
use tessera_engine::replication::{BoxFuture, ConnectError, Connection, PeerAddr, PeerConnector};

// ============================================================================
// Configs
// ============================================================================

/// In-memory config with P2P and the api pool off.
pub fn memory_config() -> NodeInitConfig {
    let mut config = NodeInitConfig::default();
    config.network.p2p_enabled = false;
    config.api.enabled = false;
    config
}

/// Persistent config rooted at `dir`, P2P and api off.
pub fn persistent_config(dir: &TempDir) -> NodeInitConfig {
    let mut config = memory_config();
    config.storage.in_memory = false;
    config.storage.path = Some(dir.path().to_path_buf());
    config
}

/// A ready in-memory node.
pub fn ready_node() -> Node {
    let node = Node::new();
    node.initialize(memory_config()).unwrap();
    node
}

/// A ready in-memory node with `retries` conflict retries.
pub fn ready_node_with_retries(retries: u32) -> Node {
    let node = Node::new();
    let mut config = memory_config();
    config.transactions.max_retries = retries;
    node.initialize(config).unwrap();
    node
}

/// Create `name`@`version` and commit.
pub fn seed_collection(node: &Node, name: &str, version: &str) {
    let txn = node.open_transaction(false).unwrap();
    node.create_collection(txn, name, &VersionId::new(version), None)
        .unwrap();
    node.commit(txn).unwrap();
}

/// Open a read-write transaction.
pub fn begin(node: &Node) -> TxnId {
    node.open_transaction(false).unwrap()
}

// ============================================================================
// Connectors
// ============================================================================

/// Connector whose dials fail; counts attempts.
#[derive(Default)]
pub struct RefusingConnector {
    pub attempts: AtomicU64,
}

impl RefusingConnector {
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PeerConnector for RefusingConnector {
    fn listen(&self, _addresses: &[PeerAddr]) -> Result<(), ConnectError> {
        Ok(())
    }

    fn connect(&self, peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let peer = peer.to_string();
        Box::pin(async move { Err(ConnectError::new(peer, "connection refused")) })
    }
}

/// Connector whose dials succeed with links that stay open.
#[derive(Default)]
pub struct AcceptingConnector;

impl PeerConnector for AcceptingConnector {
    fn listen(&self, _addresses: &[PeerAddr]) -> Result<(), ConnectError> {
        Ok(())
    }

    fn connect(&self, _peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        Box::pin(async { Ok(Connection::persistent()) })
    }
}

/// Connector whose listener cannot bind.
pub struct BrokenListener;

impl PeerConnector for BrokenListener {
    fn listen(&self, addresses: &[PeerAddr]) -> Result<(), ConnectError> {
        let first = addresses.first().map(|a| a.to_string()).unwrap_or_default();
        Err(ConnectError::new(first, "address already in use"))
    }

    fn connect(&self, peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        let peer = peer.to_string();
        Box::pin(async move { Err(ConnectError::new(peer, "not listening")) })
    }
}

/// Node using `connector` for peers.
pub fn node_with(connector: Arc<dyn PeerConnector>) -> Node {
    Node::with_components(NodeComponents {
        connector,
        ..Default::default()
    })
}
