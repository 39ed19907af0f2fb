//! JSON request dispatch
//!
//! Requests are JSON objects `{"id", "op", "params"}` and produce
//! `{"id", "ok", "result"}` or `{"id", "ok": false, "error": {"code", "message"}}`.
//! Every request runs on the node's api worker pool, so a node started with
//! the api disabled rejects them with `NotReady`.
//!
//! ## Operations
//!
//! | op | params |
//! |----|--------|
//! | `open_transaction` | `read_only` |
//! | `commit`, `discard`, `transaction_info` | `txn_id` |
//! | `resolve_collection` | `txn_id`, selector |
//! | `create_collection` | `txn_id`, `name`, `version`, `owner` |
//! | `add_collection_version` | `txn_id`, `name`, `version`, `activate` |
//! | `set_active_version` | `txn_id`, `name`, `version` |
//! | `list_collections` | `txn_id`, `include_inactive` |
//! | `grant_access`, `revoke_access` | `txn_id`, `name`, `requester`, `target` |
//! | `put_document` | `txn_id`, selector, `doc_id`, `document` |
//! | `get_document`, `delete_document` | `txn_id`, selector, `doc_id` |
//! | `list_document_ids` | `txn_id`, selector |
//! | `node_info`, `peer_statuses` | none |
//! | `add_peer`, `remove_peer` | `address` |
//!
//! A selector is `version`, `collection_id`, `name`, `identity` and
//! `include_inactive`, all optional.

use crate::boundary::{build_request, required_identity};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::{Document, Identity, TxnId, VersionId};
use tessera_engine::access::AccessRule;
use tessera_engine::node::Node;
use tessera_engine::resolver::CollectionRequest;
use thiserror::Error;
use tracing::{debug, warn};

/// One request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed back
    #[serde(default)]
    pub id: Value,
    /// Operation name
    pub op: String,
    /// Operation parameters
    #[serde(default)]
    pub params: Value,
}

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code, e.g. `"NotFoundError"`
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// One response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request
    pub id: Value,
    /// Whether the request succeeded
    pub ok: bool,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn from_result(id: Value, result: TesseraResult<Value>) -> Self {
        match result {
            Ok(value) => Response {
                id,
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Response {
                id,
                ok: false,
                result: None,
                error: Some(ErrorBody {
                    code: e.kind().code().to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Request decoding failures
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request line is not a request object
    #[error("malformed request: {0}")]
    Malformed(serde_json::Error),
    /// No such operation
    #[error("unknown op '{0}'")]
    UnknownOp(String),
    /// Parameters do not fit the operation
    #[error("invalid params for '{op}': {source}")]
    InvalidParams {
        /// Operation name
        op: String,
        /// Decoding failure
        source: serde_json::Error,
    },
}

impl From<DispatchError> for TesseraError {
    fn from(e: DispatchError) -> Self {
        TesseraError::validation(e.to_string())
    }
}

/// Serves requests against one node
#[derive(Clone)]
pub struct Dispatcher {
    node: Arc<Node>,
}

impl Dispatcher {
    /// Dispatcher for `node`
    pub fn new(node: Arc<Node>) -> Self {
        Dispatcher { node }
    }

    /// Execute one request on the api pool
    pub fn handle(&self, request: Request) -> Response {
        let Request { id, op, params } = request;
        debug!(target: "tessera::api", op = %op, "dispatch");
        let node = Arc::clone(&self.node);
        let result = self.node.call_api(move || execute(&node, &op, params));
        if let Err(e) = &result {
            debug!(target: "tessera::api", code = e.kind().code(), error = %e, "request failed");
        }
        Response::from_result(id, result)
    }

    /// Decode a JSON request line, execute it, encode the response
    pub fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!(target: "tessera::api", error = %e, "malformed request");
                Response::from_result(Value::Null, Err(DispatchError::Malformed(e).into()))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"id":null,"ok":false,"error":{{"code":"InternalError","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

#[derive(Deserialize)]
struct TxnParams {
    txn_id: u64,
}

#[derive(Deserialize)]
struct OpenParams {
    #[serde(default)]
    read_only: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Selector {
    version: String,
    collection_id: String,
    name: String,
    identity: String,
    include_inactive: bool,
}

impl Selector {
    fn request(&self) -> CollectionRequest {
        build_request(
            &self.version,
            &self.collection_id,
            &self.name,
            &self.identity,
            self.include_inactive,
        )
    }
}

#[derive(Deserialize)]
struct ResolveParams {
    txn_id: u64,
    #[serde(flatten)]
    selector: Selector,
}

#[derive(Deserialize)]
struct CreateParams {
    txn_id: u64,
    name: String,
    version: String,
    #[serde(default)]
    owner: String,
}

#[derive(Deserialize)]
struct AddVersionParams {
    txn_id: u64,
    name: String,
    version: String,
    #[serde(default)]
    activate: bool,
}

#[derive(Deserialize)]
struct ActivateParams {
    txn_id: u64,
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct AccessParams {
    txn_id: u64,
    name: String,
    #[serde(default)]
    requester: String,
    target: String,
}

#[derive(Deserialize)]
struct PeerParams {
    address: String,
}

#[derive(Deserialize)]
struct ListParams {
    txn_id: u64,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Deserialize)]
struct DocParams {
    txn_id: u64,
    doc_id: String,
    #[serde(default)]
    document: Option<Document>,
    #[serde(flatten)]
    selector: Selector,
}

fn params<T: DeserializeOwned>(op: &str, params: Value) -> TesseraResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|source| {
        DispatchError::InvalidParams {
            op: op.to_string(),
            source,
        }
        .into()
    })
}

fn json<T: Serialize>(value: T) -> TesseraResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn execute(node: &Node, op: &str, raw: Value) -> TesseraResult<Value> {
    match op {
        "open_transaction" => {
            let p: OpenParams = params(op, raw)?;
            json(node.open_transaction(p.read_only)?)
        }
        "commit" => {
            let p: TxnParams = params(op, raw)?;
            json(node.commit(TxnId::new(p.txn_id))?)
        }
        "discard" => {
            let p: TxnParams = params(op, raw)?;
            json(node.discard(TxnId::new(p.txn_id))?)
        }
        "transaction_info" => {
            let p: TxnParams = params(op, raw)?;
            json(node.transaction_info(TxnId::new(p.txn_id))?)
        }
        "resolve_collection" => {
            let p: ResolveParams = params(op, raw)?;
            let handle = node.resolve_collection(TxnId::new(p.txn_id), &p.selector.request())?;
            json(handle.description)
        }
        "create_collection" => {
            let p: CreateParams = params(op, raw)?;
            let rule = Identity::parse_optional(&p.owner).map(AccessRule::owner);
            json(node.create_collection(
                TxnId::new(p.txn_id),
                &p.name,
                &VersionId::new(p.version),
                rule,
            )?)
        }
        "add_collection_version" => {
            let p: AddVersionParams = params(op, raw)?;
            json(node.add_collection_version(
                TxnId::new(p.txn_id),
                &p.name,
                &VersionId::new(p.version),
                p.activate,
            )?)
        }
        "set_active_version" => {
            let p: ActivateParams = params(op, raw)?;
            json(node.set_active_version(TxnId::new(p.txn_id), &p.name, &VersionId::new(p.version))?)
        }
        "grant_access" => {
            let p: AccessParams = params(op, raw)?;
            let target = required_identity(&p.target)?;
            let requester = Identity::parse_optional(&p.requester);
            json(node.grant_access(TxnId::new(p.txn_id), &p.name, requester.as_ref(), target)?)
        }
        "revoke_access" => {
            let p: AccessParams = params(op, raw)?;
            let target = required_identity(&p.target)?;
            let requester = Identity::parse_optional(&p.requester);
            json(node.revoke_access(TxnId::new(p.txn_id), &p.name, requester.as_ref(), &target)?)
        }
        "list_collections" => {
            let p: ListParams = params(op, raw)?;
            json(node.list_collections(TxnId::new(p.txn_id), p.include_inactive)?)
        }
        "put_document" => {
            let p: DocParams = params(op, raw)?;
            let document = p
                .document
                .ok_or_else(|| TesseraError::validation("put_document requires 'document'"))?;
            json(node.put_document(TxnId::new(p.txn_id), &p.selector.request(), &p.doc_id, document)?)
        }
        "get_document" => {
            let p: DocParams = params(op, raw)?;
            json(node.get_document(TxnId::new(p.txn_id), &p.selector.request(), &p.doc_id)?)
        }
        "delete_document" => {
            let p: DocParams = params(op, raw)?;
            json(node.delete_document(TxnId::new(p.txn_id), &p.selector.request(), &p.doc_id)?)
        }
        "list_document_ids" => {
            let p: ResolveParams = params(op, raw)?;
            json(node.list_document_ids(TxnId::new(p.txn_id), &p.selector.request())?)
        }
        "node_info" => json(node.info()),
        "peer_statuses" => json(node.peer_statuses()?),
        "add_peer" => {
            let p: PeerParams = params(op, raw)?;
            json(node.add_peer(&p.address)?)
        }
        "remove_peer" => {
            let p: PeerParams = params(op, raw)?;
            json(node.remove_peer(&p.address)?)
        }
        other => Err(DispatchError::UnknownOp(other.to_string()).into()),
    }
}
