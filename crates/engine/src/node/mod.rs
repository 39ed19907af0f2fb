//! Node: lifecycle owner and entry point for every operation
//!
//! A [`Node`] is an explicit context object. Nothing about a node lives in
//! process globals, so several independent nodes can run in one process.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Starting --ok--> Ready --shutdown--> ShuttingDown --> Stopped
//!                                   |
//!                                   +--err--> Failed --initialize--> Starting ...
//! ```
//!
//! Every operation other than `initialize` requires `Ready` and fails with
//! `NotReady` otherwise, including once shutdown has begun.

mod stages;

pub use stages::{LOCK_FILE_NAME, WAL_FILE_NAME};

use crate::access::{AccessPolicy, AccessRule, RuleBasedPolicy};
use crate::api_pool::ApiPool;
use crate::catalog::{self, CollectionDescription};
use crate::config::{NodeInitConfig, StorageMode, ValidatedConfig};
use crate::identity::NodeIdentity;
use crate::replication::{
    OfflineConnector, PeerAddr, PeerConnector, PeerStatus, ReplicationScheduler,
};
use crate::resolver::{resolve, CollectionHandle, CollectionRequest};
use crate::transactions::{TransactionInfo, TransactionRegistry};
use parking_lot::RwLock;
use serde::Serialize;
use stages::{stage_error, start_api, NetworkStage, StorageStage};
use std::fmt;
use std::sync::Arc;
use tessera_concurrency::TransactionContext;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::{Document, Identity, TxnId, VersionId};
use tracing::{error, info, warn};

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Created, not yet initialized
    Uninitialized,
    /// Bootstrap in progress
    Starting,
    /// Serving calls
    Ready,
    /// Bootstrap failed; may be initialized again
    Failed,
    /// Shutdown in progress
    ShuttingDown,
    /// Shut down; terminal
    Stopped,
}

impl NodeState {
    /// Lower-case name used in errors
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Uninitialized => "uninitialized",
            NodeState::Starting => "starting",
            NodeState::Ready => "ready",
            NodeState::Failed => "failed",
            NodeState::ShuttingDown => "shutting_down",
            NodeState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pluggable collaborators of a node
#[derive(Clone)]
pub struct NodeComponents {
    /// Peer transport
    pub connector: Arc<dyn PeerConnector>,
    /// Collection access policy
    pub access_policy: Arc<dyn AccessPolicy>,
}

impl Default for NodeComponents {
    fn default() -> Self {
        NodeComponents {
            connector: Arc::new(OfflineConnector),
            access_policy: Arc::new(RuleBasedPolicy),
        }
    }
}

/// Diagnostic summary of a node
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    /// Lifecycle state
    pub state: NodeState,
    /// "in-memory" or "persistent" once started
    pub storage: Option<&'static str>,
    /// Whether P2P is running
    pub p2p_enabled: bool,
    /// Whether the API pool is running
    pub api_enabled: bool,
    /// Latest committed version
    pub current_version: u64,
    /// Registered transactions
    pub live_transactions: usize,
    /// Configured peers
    pub peers: usize,
    /// Node identity
    pub identity: Option<NodeIdentity>,
}

/// Everything a ready node runs
struct Subsystems {
    config: ValidatedConfig,
    storage: StorageStage,
    network: Option<NetworkStage>,
    api: Option<ApiPool>,
}

impl Subsystems {
    fn registry(&self) -> &TransactionRegistry {
        &self.storage.registry
    }

    /// Release in reverse start order
    fn stop(&self) {
        if let Some(api) = &self.api {
            api.shutdown();
        }
        if let Some(network) = &self.network {
            network.stop();
        }
        self.storage.release();
    }
}

/// One node instance
pub struct Node {
    state: RwLock<NodeState>,
    subsystems: RwLock<Option<Arc<Subsystems>>>,
    components: NodeComponents,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Create an uninitialized node with the default collaborators
    pub fn new() -> Self {
        Self::with_components(NodeComponents::default())
    }

    /// Create an uninitialized node with custom collaborators
    pub fn with_components(components: NodeComponents) -> Self {
        Node {
            state: RwLock::new(NodeState::Uninitialized),
            subsystems: RwLock::new(None),
            components,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate `config` and start storage, network and api, in that order
    ///
    /// On failure every started stage is released, the node moves to
    /// `Failed`, and the error names the failing stage. A failed node may be
    /// initialized again.
    pub fn initialize(&self, config: NodeInitConfig) -> TesseraResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                NodeState::Uninitialized | NodeState::Failed => *state = NodeState::Starting,
                NodeState::Starting | NodeState::Ready => {
                    return Err(TesseraError::AlreadyInitialized)
                }
                NodeState::ShuttingDown | NodeState::Stopped => {
                    return Err(TesseraError::not_ready(state.name()))
                }
            }
        }

        info!(target: "tessera::node", "bootstrap starting");
        let result = self.bootstrap(&config);

        let mut state = self.state.write();
        match result {
            Ok(subsystems) => {
                *self.subsystems.write() = Some(Arc::new(subsystems));
                *state = NodeState::Ready;
                info!(target: "tessera::node", "node ready");
                Ok(())
            }
            Err(e) => {
                *state = NodeState::Failed;
                error!(target: "tessera::node", error = %e, "bootstrap failed");
                Err(e)
            }
        }
    }

    fn bootstrap(&self, config: &NodeInitConfig) -> TesseraResult<Subsystems> {
        let validated = config.validate()?;

        let storage = StorageStage::start(
            &validated.storage,
            validated.sync_on_commit,
            validated.max_retries,
        )
        .map_err(|e| stage_error("storage", e))?;

        let network = match &validated.network {
            Some(net) => {
                match NetworkStage::start(net, Arc::clone(&self.components.connector)) {
                    Ok(stage) => Some(stage),
                    Err(e) => {
                        storage.release();
                        return Err(stage_error("network", e));
                    }
                }
            }
            None => None,
        };

        let api = match &validated.api {
            Some(api) => match start_api(api) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    if let Some(network) = &network {
                        network.stop();
                    }
                    storage.release();
                    return Err(stage_error("api", e));
                }
            },
            None => None,
        };

        if let Some(identity) = &validated.identity {
            info!(
                target: "tessera::node",
                key_type = %identity.key_type,
                node_id = identity.short_id(),
                "identity loaded"
            );
        }

        Ok(Subsystems {
            config: validated,
            storage,
            network,
            api,
        })
    }

    /// Stop the api pool, cancel replication, discard live transactions,
    /// flush the WAL and release the data directory
    ///
    /// Calling it again once stopped is a no-op.
    pub fn shutdown(&self) -> TesseraResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                NodeState::Ready => *state = NodeState::ShuttingDown,
                NodeState::ShuttingDown | NodeState::Stopped => return Ok(()),
                other => return Err(TesseraError::not_ready(other.name())),
            }
        }

        // State lock is released: api workers may still be calling in and
        // must observe ShuttingDown rather than block.
        let subsystems = self.subsystems.write().take();
        if let Some(subsystems) = subsystems {
            subsystems.stop();
        }

        *self.state.write() = NodeState::Stopped;
        info!(target: "tessera::node", "node stopped");
        Ok(())
    }

    fn ready(&self) -> TesseraResult<Arc<Subsystems>> {
        let state = self.state.read();
        if *state != NodeState::Ready {
            return Err(TesseraError::not_ready(state.name()));
        }
        self.subsystems
            .read()
            .clone()
            .ok_or_else(|| TesseraError::internal("ready node without subsystems"))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction at the latest committed snapshot
    pub fn open_transaction(&self, read_only: bool) -> TesseraResult<TxnId> {
        Ok(self.ready()?.registry().open(read_only))
    }

    /// Commit; returns the commit version
    pub fn commit(&self, txn_id: TxnId) -> TesseraResult<u64> {
        self.ready()?.registry().commit(txn_id)
    }

    /// Discard a transaction
    pub fn discard(&self, txn_id: TxnId) -> TesseraResult<()> {
        self.ready()?.registry().discard(txn_id)
    }

    /// State of a registered transaction
    pub fn transaction_info(&self, txn_id: TxnId) -> TesseraResult<TransactionInfo> {
        self.ready()?.registry().info(txn_id)
    }

    /// Run `f` in a fresh transaction, retrying on conflict up to the
    /// configured bound
    pub fn run_transaction<T>(
        &self,
        read_only: bool,
        f: impl FnMut(&mut TransactionContext) -> TesseraResult<T>,
    ) -> TesseraResult<T> {
        self.ready()?.registry().run(read_only, f)
    }

    /// Access policy used for resolution
    pub fn access_policy(&self) -> Arc<dyn AccessPolicy> {
        Arc::clone(&self.components.access_policy)
    }

    fn with_txn<T>(
        &self,
        txn_id: TxnId,
        f: impl FnOnce(&mut TransactionContext, &dyn AccessPolicy) -> TesseraResult<T>,
    ) -> TesseraResult<T> {
        let subsystems = self.ready()?;
        let policy = self.components.access_policy.as_ref();
        subsystems.registry().with_txn(txn_id, |txn| f(txn, policy))
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Resolve a collection inside a transaction
    pub fn resolve_collection(
        &self,
        txn_id: TxnId,
        request: &CollectionRequest,
    ) -> TesseraResult<CollectionHandle> {
        self.with_txn(txn_id, |txn, policy| resolve(txn, request, policy))
    }

    /// Register a new collection
    pub fn create_collection(
        &self,
        txn_id: TxnId,
        name: &str,
        version: &VersionId,
        rule: Option<AccessRule>,
    ) -> TesseraResult<CollectionDescription> {
        self.with_txn(txn_id, |txn, _| {
            catalog::create_collection(txn, name, version, rule)
        })
    }

    /// Register another version of a collection
    pub fn add_collection_version(
        &self,
        txn_id: TxnId,
        name: &str,
        version: &VersionId,
        activate: bool,
    ) -> TesseraResult<CollectionDescription> {
        self.with_txn(txn_id, |txn, _| {
            catalog::add_collection_version(txn, name, version, activate)
        })
    }

    /// Make one version of a collection the active one
    pub fn set_active_version(
        &self,
        txn_id: TxnId,
        name: &str,
        version: &VersionId,
    ) -> TesseraResult<CollectionDescription> {
        self.with_txn(txn_id, |txn, _| {
            catalog::set_active_version(txn, name, version)
        })
    }

    /// Let `target` use the owned collection `name`; only the owner may grant
    ///
    /// Returns false if `target` already had access.
    pub fn grant_access(
        &self,
        txn_id: TxnId,
        name: &str,
        requester: Option<&Identity>,
        target: Identity,
    ) -> TesseraResult<bool> {
        self.with_txn(txn_id, |txn, _| {
            catalog::grant_access(txn, name, requester, target)
        })
    }

    /// Withdraw a grant; only the owner may revoke
    ///
    /// Returns false if `target` had no grant.
    pub fn revoke_access(
        &self,
        txn_id: TxnId,
        name: &str,
        requester: Option<&Identity>,
        target: &Identity,
    ) -> TesseraResult<bool> {
        self.with_txn(txn_id, |txn, _| {
            catalog::revoke_access(txn, name, requester, target)
        })
    }

    /// Collections visible to a transaction
    pub fn list_collections(
        &self,
        txn_id: TxnId,
        include_inactive: bool,
    ) -> TesseraResult<Vec<CollectionDescription>> {
        self.with_txn(txn_id, |txn, _| {
            catalog::list_collections(txn, include_inactive)
        })
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Resolve `request` and write a document
    pub fn put_document(
        &self,
        txn_id: TxnId,
        request: &CollectionRequest,
        doc_id: &str,
        document: Document,
    ) -> TesseraResult<()> {
        self.with_txn(txn_id, |txn, policy| {
            resolve(txn, request, policy)?.put_document(txn, doc_id, document)
        })
    }

    /// Resolve `request` and read a document
    pub fn get_document(
        &self,
        txn_id: TxnId,
        request: &CollectionRequest,
        doc_id: &str,
    ) -> TesseraResult<Option<Document>> {
        self.with_txn(txn_id, |txn, policy| {
            resolve(txn, request, policy)?.get_document(txn, doc_id)
        })
    }

    /// Resolve `request` and delete a document
    pub fn delete_document(
        &self,
        txn_id: TxnId,
        request: &CollectionRequest,
        doc_id: &str,
    ) -> TesseraResult<bool> {
        self.with_txn(txn_id, |txn, policy| {
            resolve(txn, request, policy)?.delete_document(txn, doc_id)
        })
    }

    /// Resolve `request` and list its document ids
    pub fn list_document_ids(
        &self,
        txn_id: TxnId,
        request: &CollectionRequest,
    ) -> TesseraResult<Vec<String>> {
        self.with_txn(txn_id, |txn, policy| {
            resolve(txn, request, policy)?.list_document_ids(txn)
        })
    }

    // ========================================================================
    // Peers
    // ========================================================================

    fn scheduler<T>(&self, f: impl FnOnce(&ReplicationScheduler) -> T) -> TesseraResult<T> {
        let subsystems = self.ready()?;
        match &subsystems.network {
            Some(network) => Ok(f(&network.scheduler)),
            None => Err(TesseraError::not_ready("p2p disabled")),
        }
    }

    /// Start replicating with `address`; false if it is already a peer
    pub fn add_peer(&self, address: &str) -> TesseraResult<bool> {
        let peer = PeerAddr::parse_dialable(address)?;
        let added = self.scheduler(|s| s.add_peer(peer))?;
        info!(target: "tessera::node", peer = address.trim(), added, "peer added");
        Ok(added)
    }

    /// Stop replicating with `address`; false if it was not a peer
    pub fn remove_peer(&self, address: &str) -> TesseraResult<bool> {
        let peer = PeerAddr::parse_dialable(address)?;
        let removed = self.scheduler(|s| s.remove_peer(&peer))?;
        info!(target: "tessera::node", peer = address.trim(), removed, "peer removed");
        Ok(removed)
    }

    /// Status of every peer (empty with P2P disabled)
    pub fn peer_statuses(&self) -> TesseraResult<Vec<PeerStatus>> {
        let subsystems = self.ready()?;
        Ok(subsystems
            .network
            .as_ref()
            .map(|n| n.scheduler.statuses())
            .unwrap_or_default())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Node identity, if key material was configured
    pub fn identity(&self) -> TesseraResult<Option<NodeIdentity>> {
        Ok(self.ready()?.config.identity.clone())
    }

    /// Summary of the node; available in every state
    pub fn info(&self) -> NodeInfo {
        let state = self.state();
        let subsystems = self.subsystems.read().clone();
        match subsystems {
            Some(s) => NodeInfo {
                state,
                storage: Some(s.storage.mode.name()),
                p2p_enabled: s.network.is_some(),
                api_enabled: s.api.is_some(),
                current_version: s.registry().current_version(),
                live_transactions: s.registry().live_count(),
                peers: s.network.as_ref().map_or(0, |n| n.scheduler.peer_count()),
                identity: s.config.identity.clone(),
            },
            None => NodeInfo {
                state,
                storage: None,
                p2p_enabled: false,
                api_enabled: false,
                current_version: 0,
                live_transactions: 0,
                peers: 0,
                identity: None,
            },
        }
    }

    /// Data directory of a persistent node
    pub fn data_dir(&self) -> Option<std::path::PathBuf> {
        let subsystems = self.subsystems.read().clone()?;
        match &subsystems.storage.mode {
            StorageMode::Persistent(dir) => Some(dir.clone()),
            StorageMode::InMemory => None,
        }
    }

    /// Run `f` on the api worker pool and wait for its result
    ///
    /// Fails with `NotReady` when the api is disabled.
    pub fn call_api<T: Send + 'static>(
        &self,
        f: impl FnOnce() -> TesseraResult<T> + Send + 'static,
    ) -> TesseraResult<T> {
        let subsystems = self.ready()?;
        match &subsystems.api {
            Some(pool) => pool.call(f),
            None => Err(TesseraError::not_ready("api disabled")),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.state() == NodeState::Ready {
            if let Err(e) = self.shutdown() {
                warn!(target: "tessera::node", error = %e, "shutdown on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{BoxFuture, ConnectError, Connection, PeerAddr};
    use serde_json::json;
    use tempfile::TempDir;
    use tessera_core::error::ErrorKind;

    struct FailingListener;

    impl PeerConnector for FailingListener {
        fn listen(&self, _addresses: &[PeerAddr]) -> Result<(), ConnectError> {
            Err(ConnectError::new("/ip4/0.0.0.0/tcp/9171", "address in use"))
        }

        fn connect(&self, peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>> {
            let peer = peer.to_string();
            Box::pin(async move { Err(ConnectError::new(peer, "unreachable")) })
        }
    }

    fn in_memory() -> NodeInitConfig {
        let mut cfg = NodeInitConfig::default();
        cfg.network.p2p_enabled = false;
        cfg.api.enabled = false;
        cfg
    }

    fn persistent(dir: &std::path::Path) -> NodeInitConfig {
        let mut cfg = in_memory();
        cfg.storage.in_memory = false;
        cfg.storage.path = Some(dir.to_path_buf());
        cfg
    }

    #[test]
    fn test_initialize_reaches_ready() {
        let node = Node::new();
        assert_eq!(node.state(), NodeState::Uninitialized);
        node.initialize(in_memory()).unwrap();
        assert_eq!(node.state(), NodeState::Ready);
        assert_eq!(node.info().storage, Some("in-memory"));
    }

    #[test]
    fn test_second_initialize_fails() {
        let node = Node::new();
        node.initialize(in_memory()).unwrap();
        let err = node.initialize(in_memory()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);
        assert_eq!(node.state(), NodeState::Ready);
    }

    #[test]
    fn test_calls_before_initialize_are_not_ready() {
        let node = Node::new();
        let err = node.open_transaction(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(err.to_string().contains("uninitialized"));
    }

    #[test]
    fn test_invalid_config_fails_and_allows_retry() {
        let node = Node::new();
        let mut cfg = in_memory();
        cfg.storage.path = Some("/tmp/both".into());
        let err = node.initialize(cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(node.state(), NodeState::Failed);
        assert!(node.open_transaction(false).is_err());

        node.initialize(in_memory()).unwrap();
        assert_eq!(node.state(), NodeState::Ready);
    }

    #[test]
    fn test_storage_failure_names_stage() {
        let dir = TempDir::new().unwrap();
        let holder = Node::new();
        holder.initialize(persistent(dir.path())).unwrap();

        let node = Node::new();
        let err = node.initialize(persistent(dir.path())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bootstrap);
        assert!(err.to_string().contains("'storage'"));
        assert_eq!(node.state(), NodeState::Failed);
    }

    #[test]
    fn test_network_failure_releases_storage() {
        let dir = TempDir::new().unwrap();
        let components = NodeComponents {
            connector: Arc::new(FailingListener),
            ..Default::default()
        };
        let node = Node::with_components(components);
        let mut cfg = persistent(dir.path());
        cfg.network.p2p_enabled = true;
        cfg.network.listen_addresses = vec!["/ip4/0.0.0.0/tcp/9171".into()];

        let err = node.initialize(cfg).unwrap_err();
        assert!(err.to_string().contains("'network'"));
        assert_eq!(node.state(), NodeState::Failed);

        // The data directory lock was released by the rollback
        let other = Node::new();
        other.initialize(persistent(dir.path())).unwrap();
    }

    #[test]
    fn test_shutdown_fails_later_calls() {
        let node = Node::new();
        let mut cfg = in_memory();
        cfg.api.enabled = true;
        cfg.network.p2p_enabled = true;
        cfg.network.peers = vec!["/ip4/127.0.0.1/tcp/9".into()];
        node.initialize(cfg).unwrap();
        let txn = node.open_transaction(false).unwrap();

        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
        assert_eq!(node.commit(txn).unwrap_err().kind(), ErrorKind::NotReady);
        assert_eq!(
            node.open_transaction(false).unwrap_err().kind(),
            ErrorKind::NotReady
        );
        assert_eq!(
            node.initialize(in_memory()).unwrap_err().kind(),
            ErrorKind::NotReady
        );
        node.shutdown().unwrap();
    }

    #[test]
    fn test_persistent_node_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let node = Node::new();
            node.initialize(persistent(dir.path())).unwrap();
            let txn = node.open_transaction(false).unwrap();
            node.create_collection(txn, "Users", &VersionId::new("v1"), None)
                .unwrap();
            node.put_document(txn, &CollectionRequest::by_name("Users"), "u1", json!({"n": 1}))
                .unwrap();
            node.commit(txn).unwrap();
            node.shutdown().unwrap();
        }

        let node = Node::new();
        node.initialize(persistent(dir.path())).unwrap();
        assert_eq!(node.data_dir().as_deref(), Some(dir.path()));
        let txn = node.open_transaction(true).unwrap();
        assert_eq!(
            node.get_document(txn, &CollectionRequest::by_name("Users"), "u1")
                .unwrap(),
            Some(json!({"n": 1}))
        );
    }

    #[test]
    fn test_run_transaction_commits() {
        let node = Node::new();
        node.initialize(in_memory()).unwrap();
        let policy = node.access_policy();
        node.run_transaction(false, |txn| {
            catalog::create_collection(txn, "Counters", &VersionId::new("v1"), None)?;
            Ok(())
        })
        .unwrap();
        let value = node
            .run_transaction(false, |txn| {
                let handle = resolve(txn, &CollectionRequest::by_name("Counters"), policy.as_ref())?;
                handle.put_document(txn, "c", json!(1))?;
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(node.info().current_version, 2);
    }

    #[test]
    fn test_identity_and_info() {
        let node = Node::new();
        let mut cfg = in_memory();
        cfg.identity.private_key =
            Some("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".into());
        node.initialize(cfg).unwrap();
        let identity = node.identity().unwrap().unwrap();
        assert_eq!(node.info().identity, Some(identity));
        assert!(!node.info().p2p_enabled);
        assert!(node.peer_statuses().unwrap().is_empty());
    }

    #[test]
    fn test_call_api_requires_enabled_pool() {
        let node = Node::new();
        node.initialize(in_memory()).unwrap();
        assert_eq!(
            node.call_api(|| Ok(1)).unwrap_err().kind(),
            ErrorKind::NotReady
        );

        let node = Node::new();
        let mut cfg = in_memory();
        cfg.api.enabled = true;
        node.initialize(cfg).unwrap();
        assert_eq!(node.call_api(|| Ok(1)).unwrap(), 1);
    }

    #[test]
    fn test_independent_nodes_in_one_process() {
        let a = Node::new();
        let b = Node::new();
        a.initialize(in_memory()).unwrap();
        b.initialize(in_memory()).unwrap();
        let txn = a.open_transaction(false).unwrap();
        a.create_collection(txn, "OnlyInA", &VersionId::new("v1"), None)
            .unwrap();
        a.commit(txn).unwrap();

        let txn = b.open_transaction(true).unwrap();
        assert!(b.list_collections(txn, true).unwrap().is_empty());
    }

    #[test]
    fn test_peers_added_and_removed_at_runtime() {
        let node = Node::new();
        let mut cfg = in_memory();
        cfg.network.p2p_enabled = true;
        node.initialize(cfg).unwrap();

        assert!(node.add_peer("/ip4/10.0.0.7/tcp/9171").unwrap());
        assert!(!node.add_peer("/ip4/10.0.0.7/tcp/9171").unwrap());
        assert_eq!(node.info().peers, 1);
        assert_eq!(node.peer_statuses().unwrap().len(), 1);
        assert_eq!(
            node.add_peer("/ip4/10.0.0.7/tcp/0").unwrap_err().kind(),
            ErrorKind::Validation
        );

        assert!(node.remove_peer("/ip4/10.0.0.7/tcp/9171").unwrap());
        assert!(!node.remove_peer("/ip4/10.0.0.7/tcp/9171").unwrap());
        assert!(node.peer_statuses().unwrap().is_empty());
        node.shutdown().unwrap();

        let offline = Node::new();
        offline.initialize(in_memory()).unwrap();
        assert_eq!(
            offline.add_peer("/ip4/10.0.0.7/tcp/9171").unwrap_err().kind(),
            ErrorKind::NotReady
        );
    }

    #[test]
    fn test_granted_identity_can_resolve() {
        let node = Node::new();
        node.initialize(in_memory()).unwrap();
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        let txn = node.open_transaction(false).unwrap();
        node.create_collection(
            txn,
            "Vault",
            &VersionId::new("v1"),
            Some(AccessRule::owner(alice.clone())),
        )
        .unwrap();

        let as_bob = CollectionRequest::by_name("Vault").with_identity(bob.clone());
        assert_eq!(
            node.resolve_collection(txn, &as_bob).unwrap_err().kind(),
            ErrorKind::Authorization
        );
        assert!(node.grant_access(txn, "Vault", Some(&alice), bob.clone()).unwrap());
        assert!(node.resolve_collection(txn, &as_bob).is_ok());
        assert!(node.revoke_access(txn, "Vault", Some(&alice), &bob).unwrap());
        assert!(node.resolve_collection(txn, &as_bob).is_err());
    }
}
