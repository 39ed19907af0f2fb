//! Collection resolution
//!
//! Maps a [`CollectionRequest`] to a [`CollectionHandle`] inside one
//! transaction. Resolution reads the catalog through the transaction's
//! snapshot plus its own buffered writes, and never records reads: it does
//! not change the transaction in any way.
//!
//! Rules, in order:
//! 1. neither id nor name given: `Validation`
//! 2. an id takes precedence over a name
//! 3. a version tag must match exactly
//! 4. inactive versions are invisible unless `include_inactive`; a miss is
//!    `NotFound`
//! 5. several candidates left: `AmbiguousLookup`
//! 6. the caller, anonymous or not, must pass the access policy:
//!    `Authorization`

use crate::access::{AccessPolicy, ANONYMOUS};
use crate::catalog::{load_descriptions, CollectionDescription};
use serde::Serialize;
use tessera_concurrency::TransactionContext;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::{CollectionId, Document, Identity, Key, TxnId, VersionId};

/// What to resolve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRequest {
    /// Required version tag
    pub version: Option<VersionId>,
    /// Collection id (wins over `name`)
    pub collection_id: Option<CollectionId>,
    /// Collection name
    pub name: Option<String>,
    /// Requesting principal; `None` is anonymous
    pub identity: Option<Identity>,
    /// Consider inactive versions
    pub include_inactive: bool,
}

impl CollectionRequest {
    /// Request by name
    pub fn by_name(name: impl Into<String>) -> Self {
        CollectionRequest {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Request by id
    pub fn by_id(id: CollectionId) -> Self {
        CollectionRequest {
            collection_id: Some(id),
            ..Default::default()
        }
    }

    /// Require an exact version
    pub fn with_version(mut self, version: VersionId) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach an identity
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Include inactive versions
    pub fn include_inactive(mut self, include: bool) -> Self {
        self.include_inactive = include;
        self
    }

    fn describe(&self) -> String {
        let target = match (&self.collection_id, &self.name) {
            (Some(id), _) => format!("id {}", id),
            (None, Some(name)) => format!("'{}'", name),
            (None, None) => "<none>".to_string(),
        };
        match &self.version {
            Some(v) => format!("{} version '{}'", target, v),
            None => target,
        }
    }
}

/// A resolved collection bound to the transaction that resolved it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionHandle {
    /// Catalog record
    pub description: CollectionDescription,
    /// Owning transaction
    pub txn_id: TxnId,
}

/// Resolve `request` inside `txn`
pub fn resolve(
    txn: &TransactionContext,
    request: &CollectionRequest,
    policy: &dyn AccessPolicy,
) -> TesseraResult<CollectionHandle> {
    txn.ensure_active()?;

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    if request.collection_id.is_none() && name.is_none() {
        return Err(TesseraError::validation(
            "collection request needs an id or a name",
        ));
    }

    let mut candidates: Vec<CollectionDescription> = match &request.collection_id {
        Some(id) => txn
            .view_get(&Key::catalog(id))?
            .map(serde_json::from_value::<CollectionDescription>)
            .transpose()
            .map_err(|e| TesseraError::storage(format!("corrupt catalog entry {}: {}", id, e)))?
            .into_iter()
            .collect(),
        None => load_descriptions(txn)?
            .into_iter()
            .filter(|d| Some(d.name.as_str()) == name)
            .collect(),
    };

    if let Some(version) = &request.version {
        candidates.retain(|d| &d.version_id == version);
    }
    if !request.include_inactive {
        candidates.retain(|d| d.active);
    }

    let description = match candidates.len() {
        0 => return Err(TesseraError::not_found("collection", request.describe())),
        1 => candidates.remove(0),
        n => {
            return Err(TesseraError::AmbiguousLookup {
                name: name.unwrap_or_default().to_string(),
                candidates: n,
            })
        }
    };

    if !policy.check(request.identity.as_ref(), &description) {
        return Err(TesseraError::Authorization {
            identity: request
                .identity
                .as_ref()
                .map_or_else(|| ANONYMOUS.to_string(), Identity::to_string),
            collection: description.name.clone(),
        });
    }

    Ok(CollectionHandle {
        description,
        txn_id: txn.txn_id(),
    })
}

impl CollectionHandle {
    fn ensure_owner(&self, txn: &TransactionContext) -> TesseraResult<()> {
        if txn.txn_id() != self.txn_id {
            return Err(TesseraError::validation(format!(
                "handle for collection '{}' belongs to transaction {}, not {}",
                self.description.name,
                self.txn_id,
                txn.txn_id()
            )));
        }
        Ok(())
    }

    fn doc_key(&self, doc_id: &str) -> TesseraResult<Key> {
        if doc_id.is_empty() {
            return Err(TesseraError::validation("document id must not be empty"));
        }
        Ok(Key::document(&self.description.id, doc_id))
    }

    /// Insert or replace a document
    pub fn put_document(
        &self,
        txn: &mut TransactionContext,
        doc_id: &str,
        document: Document,
    ) -> TesseraResult<()> {
        self.ensure_owner(txn)?;
        let key = self.doc_key(doc_id)?;
        txn.put(key, document)
    }

    /// Read a document (tracked for conflict detection)
    pub fn get_document(
        &self,
        txn: &mut TransactionContext,
        doc_id: &str,
    ) -> TesseraResult<Option<Document>> {
        self.ensure_owner(txn)?;
        let key = self.doc_key(doc_id)?;
        txn.get(&key)
    }

    /// Delete a document; returns whether it was visible before
    ///
    /// The delete is blind: it does not add the key to the read set.
    pub fn delete_document(&self, txn: &mut TransactionContext, doc_id: &str) -> TesseraResult<bool> {
        self.ensure_owner(txn)?;
        let key = self.doc_key(doc_id)?;
        let existed = txn.view_get(&key)?.is_some();
        txn.delete(key)?;
        Ok(existed)
    }

    /// Ids of every document in the collection, sorted
    pub fn list_document_ids(&self, txn: &mut TransactionContext) -> TesseraResult<Vec<String>> {
        self.ensure_owner(txn)?;
        let prefix = Key::documents_prefix(&self.description.id);
        Ok(txn
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| key.name)
            .collect())
    }
}
