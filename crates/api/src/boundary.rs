//! Boundary surface
//!
//! [`NodeHandle`] wraps one [`Node`] and exposes every operation as a call
//! returning a [`CallResult`]: success carries the JSON-encoded value, failure
//! carries the error message. Transaction ids cross the boundary as plain
//! `u64`, optional strings as empty strings.
//!
//! Unit-returning operations succeed with the value `null`.

use crate::options::NodeInitOptions;
use std::sync::Arc;
use tessera_core::contract::CallResult;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::{CollectionId, Document, Identity, TxnId, VersionId};
use tessera_engine::access::AccessRule;
use tessera_engine::node::{Node, NodeComponents};
use tessera_engine::resolver::CollectionRequest;
use tracing::debug;

/// Handle to one node, shareable across threads
#[derive(Clone)]
pub struct NodeHandle {
    node: Arc<Node>,
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeHandle {
    /// Handle to a fresh node with the default collaborators
    pub fn new() -> Self {
        NodeHandle {
            node: Arc::new(Node::new()),
        }
    }

    /// Handle to a fresh node with custom collaborators
    pub fn with_components(components: NodeComponents) -> Self {
        NodeHandle {
            node: Arc::new(Node::with_components(components)),
        }
    }

    /// The wrapped node
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Bootstrap the node from flat options
    pub fn initialize(&self, options: NodeInitOptions) -> CallResult {
        let result = options
            .into_config()
            .and_then(|config| self.node.initialize(config));
        finish("initialize", result)
    }

    /// Open a transaction; the value is its id
    pub fn open_transaction(&self, read_only: bool) -> CallResult {
        finish(
            "open_transaction",
            self.node.open_transaction(read_only).map(|id| id.as_u64()),
        )
    }

    /// Commit; the value is the commit version
    pub fn commit(&self, txn_id: u64) -> CallResult {
        finish("commit", self.node.commit(TxnId::new(txn_id)))
    }

    /// Discard
    pub fn discard(&self, txn_id: u64) -> CallResult {
        finish("discard", self.node.discard(TxnId::new(txn_id)))
    }

    /// Resolve a collection; the value is its description
    ///
    /// An id takes precedence over a name. Empty strings are absent.
    pub fn resolve_collection(
        &self,
        txn_id: u64,
        version: &str,
        collection_id: &str,
        name: &str,
        identity: &str,
        get_inactive: bool,
    ) -> CallResult {
        let request = build_request(version, collection_id, name, identity, get_inactive);
        let result = self
            .node
            .resolve_collection(TxnId::new(txn_id), &request)
            .map(|handle| handle.description);
        finish("resolve_collection", result)
    }

    /// Register a collection; a non-empty `owner` restricts it to that identity
    pub fn create_collection(
        &self,
        txn_id: u64,
        name: &str,
        version: &str,
        owner: &str,
    ) -> CallResult {
        let rule = Identity::parse_optional(owner).map(AccessRule::owner);
        finish(
            "create_collection",
            self.node
                .create_collection(TxnId::new(txn_id), name, &VersionId::new(version), rule),
        )
    }

    /// Register another version of a collection
    pub fn add_collection_version(
        &self,
        txn_id: u64,
        name: &str,
        version: &str,
        activate: bool,
    ) -> CallResult {
        finish(
            "add_collection_version",
            self.node.add_collection_version(
                TxnId::new(txn_id),
                name,
                &VersionId::new(version),
                activate,
            ),
        )
    }

    /// Make `version` the active version of `name`
    pub fn set_active_version(&self, txn_id: u64, name: &str, version: &str) -> CallResult {
        finish(
            "set_active_version",
            self.node
                .set_active_version(TxnId::new(txn_id), name, &VersionId::new(version)),
        )
    }

    /// Let `target` use the collection `name`; `requester` must own it
    ///
    /// The value is whether access changed.
    pub fn grant_access(&self, txn_id: u64, name: &str, requester: &str, target: &str) -> CallResult {
        let result = required_identity(target).and_then(|target| {
            self.node.grant_access(
                TxnId::new(txn_id),
                name,
                Identity::parse_optional(requester).as_ref(),
                target,
            )
        });
        finish("grant_access", result)
    }

    /// Withdraw a grant made with [`NodeHandle::grant_access`]
    pub fn revoke_access(&self, txn_id: u64, name: &str, requester: &str, target: &str) -> CallResult {
        let result = required_identity(target).and_then(|target| {
            self.node.revoke_access(
                TxnId::new(txn_id),
                name,
                Identity::parse_optional(requester).as_ref(),
                &target,
            )
        });
        finish("revoke_access", result)
    }

    /// Write a JSON document into the named collection
    pub fn put_document(
        &self,
        txn_id: u64,
        name: &str,
        version: &str,
        identity: &str,
        doc_id: &str,
        document_json: &str,
    ) -> CallResult {
        let result = parse_document(document_json).and_then(|document| {
            let request = build_request(version, "", name, identity, false);
            self.node
                .put_document(TxnId::new(txn_id), &request, doc_id, document)
        });
        finish("put_document", result)
    }

    /// Read a document; the value is the document or `null`
    pub fn get_document(
        &self,
        txn_id: u64,
        name: &str,
        version: &str,
        identity: &str,
        doc_id: &str,
    ) -> CallResult {
        let request = build_request(version, "", name, identity, false);
        finish(
            "get_document",
            self.node
                .get_document(TxnId::new(txn_id), &request, doc_id),
        )
    }

    /// Node summary
    pub fn node_info(&self) -> CallResult {
        CallResult::success(&self.node.info())
    }

    /// Reconnect state of every peer
    pub fn peer_statuses(&self) -> CallResult {
        finish("peer_statuses", self.node.peer_statuses())
    }

    /// Start replicating with a peer; the value is whether it was new
    pub fn add_peer(&self, address: &str) -> CallResult {
        finish("add_peer", self.node.add_peer(address))
    }

    /// Stop replicating with a peer; the value is whether it was known
    pub fn remove_peer(&self, address: &str) -> CallResult {
        finish("remove_peer", self.node.remove_peer(address))
    }

    /// Shut the node down
    pub fn shutdown(&self) -> CallResult {
        finish("shutdown", self.node.shutdown())
    }
}

/// Build a resolution request from boundary strings
pub(crate) fn build_request(
    version: &str,
    collection_id: &str,
    name: &str,
    identity: &str,
    include_inactive: bool,
) -> CollectionRequest {
    let mut request = match non_empty(collection_id) {
        Some(id) => CollectionRequest::by_id(CollectionId::from_string(id)),
        None => CollectionRequest::by_name(name),
    };
    if let (Some(_), Some(name)) = (non_empty(collection_id), non_empty(name)) {
        request.name = Some(name.to_string());
    }
    if let Some(version) = non_empty(version) {
        request = request.with_version(VersionId::new(version));
    }
    if let Some(identity) = Identity::parse_optional(identity) {
        request = request.with_identity(identity);
    }
    request.include_inactive(include_inactive)
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Parse an identity that must be present
pub(crate) fn required_identity(raw: &str) -> TesseraResult<Identity> {
    Identity::parse_optional(raw)
        .ok_or_else(|| TesseraError::validation("target identity must not be empty"))
}

fn parse_document(json: &str) -> TesseraResult<Document> {
    serde_json::from_str(json)
        .map_err(|e| TesseraError::validation(format!("document is not valid JSON: {}", e)))
}

fn finish<T: serde::Serialize>(op: &'static str, result: TesseraResult<T>) -> CallResult {
    if let Err(e) = &result {
        debug!(target: "tessera::api", op, code = e.kind().code(), error = %e, "call failed");
    }
    CallResult::from_result(result)
}
