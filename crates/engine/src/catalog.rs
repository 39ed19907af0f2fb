//! Collection catalog
//!
//! Every (name, version) pair of a collection is one [`CollectionDescription`]
//! stored as JSON under `Key::catalog(id)`. All catalog changes go through a
//! transaction, so they commit atomically with any document writes and are
//! subject to the same conflict detection.
//!
//! At most one version of a name is active at a time. Mutating operations
//! scan the catalog through the tracked read path, so two transactions
//! racing to register the same name conflict at commit.

use crate::access::{AccessRule, ANONYMOUS};
use serde::{Deserialize, Serialize};
use tessera_concurrency::TransactionContext;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::{CollectionId, Document, Identity, Key, VersionId};
use tracing::debug;

/// Catalog record of one collection version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescription {
    /// Unique id of this version
    pub id: CollectionId,
    /// Collection name shared by all versions
    pub name: String,
    /// Version tag
    pub version_id: VersionId,
    /// Whether this version is the one served by default
    pub active: bool,
    /// Access rule; `None` is public
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<AccessRule>,
}

impl CollectionDescription {
    /// Storage key of this description
    pub fn key(&self) -> Key {
        Key::catalog(&self.id)
    }

    fn to_document(&self) -> TesseraResult<Document> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_document(doc: Document) -> TesseraResult<Self> {
        serde_json::from_value(doc)
            .map_err(|e| TesseraError::storage(format!("corrupt catalog entry: {}", e)))
    }
}

fn decode_all(entries: Vec<(Key, Document)>) -> TesseraResult<Vec<CollectionDescription>> {
    entries
        .into_iter()
        .map(|(_, doc)| CollectionDescription::from_document(doc))
        .collect()
}

/// Every description visible to `txn`, without read tracking
pub fn load_descriptions(txn: &TransactionContext) -> TesseraResult<Vec<CollectionDescription>> {
    decode_all(txn.view_scan_prefix(&Key::catalog_prefix())?)
}

/// Versions of `name`, read through the tracked path
fn versions_of(txn: &mut TransactionContext, name: &str) -> TesseraResult<Vec<CollectionDescription>> {
    let all = decode_all(txn.scan_prefix(&Key::catalog_prefix())?)?;
    Ok(all.into_iter().filter(|d| d.name == name).collect())
}

fn check_name(name: &str) -> TesseraResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TesseraError::validation("collection name must not be empty"));
    }
    Ok(trimmed)
}

fn check_version(version: &VersionId) -> TesseraResult<()> {
    if version.as_str().trim().is_empty() {
        return Err(TesseraError::validation("collection version must not be empty"));
    }
    Ok(())
}

fn store(txn: &mut TransactionContext, desc: &CollectionDescription) -> TesseraResult<()> {
    txn.put(desc.key(), desc.to_document()?)
}

/// Register a new collection with its first (active) version
///
/// Fails with `Validation` if the name is already registered; further
/// versions go through [`add_collection_version`].
pub fn create_collection(
    txn: &mut TransactionContext,
    name: &str,
    version: &VersionId,
    rule: Option<AccessRule>,
) -> TesseraResult<CollectionDescription> {
    let name = check_name(name)?;
    check_version(version)?;

    let existing = versions_of(txn, name)?;
    if !existing.is_empty() {
        return Err(TesseraError::validation(format!(
            "collection '{}' already exists with {} version(s)",
            name,
            existing.len()
        )));
    }

    let desc = CollectionDescription {
        id: CollectionId::generate(),
        name: name.to_string(),
        version_id: version.clone(),
        active: true,
        rule,
    };
    store(txn, &desc)?;
    debug!(
        target: "tessera::txn",
        txn_id = %txn.txn_id(),
        collection = %desc.name,
        version = %desc.version_id,
        "collection created"
    );
    Ok(desc)
}

/// Register another version of an existing collection
///
/// The new version inherits the access rule of the currently active (or
/// else most recent) version. With `activate`, every other version becomes
/// inactive; without it, the new version is registered inactive.
pub fn add_collection_version(
    txn: &mut TransactionContext,
    name: &str,
    version: &VersionId,
    activate: bool,
) -> TesseraResult<CollectionDescription> {
    let name = check_name(name)?;
    check_version(version)?;

    let existing = versions_of(txn, name)?;
    if existing.is_empty() {
        return Err(TesseraError::not_found("collection", name));
    }
    if existing.iter().any(|d| &d.version_id == version) {
        return Err(TesseraError::validation(format!(
            "collection '{}' already has version '{}'",
            name, version
        )));
    }

    let rule = existing
        .iter()
        .find(|d| d.active)
        .or_else(|| existing.last())
        .and_then(|d| d.rule.clone());

    if activate {
        for mut other in existing.into_iter().filter(|d| d.active) {
            other.active = false;
            store(txn, &other)?;
        }
    }

    let desc = CollectionDescription {
        id: CollectionId::generate(),
        name: name.to_string(),
        version_id: version.clone(),
        active: activate,
        rule,
    };
    store(txn, &desc)?;
    debug!(
        target: "tessera::txn",
        txn_id = %txn.txn_id(),
        collection = %desc.name,
        version = %desc.version_id,
        activate,
        "collection version added"
    );
    Ok(desc)
}

/// Make `version` the only active version of `name`
pub fn set_active_version(
    txn: &mut TransactionContext,
    name: &str,
    version: &VersionId,
) -> TesseraResult<CollectionDescription> {
    let name = check_name(name)?;
    check_version(version)?;

    let existing = versions_of(txn, name)?;
    if existing.is_empty() {
        return Err(TesseraError::not_found("collection", name));
    }
    if !existing.iter().any(|d| &d.version_id == version) {
        return Err(TesseraError::not_found(
            "collection version",
            format!("{}@{}", name, version),
        ));
    }

    let mut activated = None;
    for mut desc in existing {
        let should_be_active = &desc.version_id == version;
        if desc.active != should_be_active {
            desc.active = should_be_active;
            store(txn, &desc)?;
        }
        if should_be_active {
            activated = Some(desc);
        }
    }
    activated.ok_or_else(|| TesseraError::internal("activated version vanished"))
}

/// Let `target` use every version of the owned collection `name`
///
/// Only the owner may grant. Returns false if `target` already had access.
pub fn grant_access(
    txn: &mut TransactionContext,
    name: &str,
    requester: Option<&Identity>,
    target: Identity,
) -> TesseraResult<bool> {
    let changed = change_access(txn, name, requester, &target, |rule| rule.grant(target.clone()))?;
    debug!(
        target: "tessera::txn",
        txn_id = %txn.txn_id(),
        collection = name,
        identity = %target,
        changed,
        "access granted"
    );
    Ok(changed)
}

/// Withdraw a grant made with [`grant_access`]
///
/// Returns false if `target` had no grant.
pub fn revoke_access(
    txn: &mut TransactionContext,
    name: &str,
    requester: Option<&Identity>,
    target: &Identity,
) -> TesseraResult<bool> {
    let changed = change_access(txn, name, requester, target, |rule| rule.revoke(target))?;
    debug!(
        target: "tessera::txn",
        txn_id = %txn.txn_id(),
        collection = name,
        identity = %target,
        changed,
        "access revoked"
    );
    Ok(changed)
}

fn change_access(
    txn: &mut TransactionContext,
    name: &str,
    requester: Option<&Identity>,
    target: &Identity,
    mut apply: impl FnMut(&mut AccessRule) -> bool,
) -> TesseraResult<bool> {
    let name = check_name(name)?;
    if target.as_str().trim().is_empty() {
        return Err(TesseraError::validation("grant target must not be empty"));
    }

    let existing = versions_of(txn, name)?;
    let current = existing
        .iter()
        .find(|d| d.active)
        .or_else(|| existing.last())
        .ok_or_else(|| TesseraError::not_found("collection", name))?;
    let owner = current
        .rule
        .as_ref()
        .and_then(AccessRule::owner_identity)
        .cloned()
        .ok_or_else(|| {
            TesseraError::validation(format!("collection '{}' is public and has no owner", name))
        })?;

    if requester != Some(&owner) {
        return Err(TesseraError::Authorization {
            identity: requester.map_or_else(|| ANONYMOUS.to_string(), Identity::to_string),
            collection: name.to_string(),
        });
    }
    if target == &owner {
        return Err(TesseraError::validation(format!(
            "'{}' owns collection '{}'",
            target, name
        )));
    }

    let mut changed = false;
    for mut desc in existing {
        let updated = desc.rule.as_mut().map_or(false, &mut apply);
        if updated {
            store(txn, &desc)?;
            changed = true;
        }
    }
    Ok(changed)
}

/// Collections visible to `txn`, sorted by name then version
///
/// Read through the untracked path: listing never causes a conflict.
pub fn list_collections(
    txn: &TransactionContext,
    include_inactive: bool,
) -> TesseraResult<Vec<CollectionDescription>> {
    let mut all: Vec<CollectionDescription> = load_descriptions(txn)?
        .into_iter()
        .filter(|d| include_inactive || d.active)
        .collect();
    all.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.version_id.cmp(&b.version_id))
    });
    Ok(all)
}
