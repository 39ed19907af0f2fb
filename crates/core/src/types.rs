//! Core identifier and key types
//!
//! This module defines:
//! - TxnId: opaque transaction handle issued by the node
//! - CollectionId / VersionId: collection addressing
//! - Identity: authorization principal attached to a request
//! - Space / Key: storage addressing (catalog vs per-collection documents)
//! - VersionedValue: a stored document with its commit version

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Document payload type
///
/// Documents are JSON values; the storage engine treats them as opaque.
pub type Document = serde_json::Value;

/// Opaque transaction handle
///
/// Issued by the node when a transaction is opened. Ids are unique per node
/// and never reused. Zero is reserved and never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of one collection version
///
/// Every registered (name, version) pair gets its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        CollectionId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string
    pub fn from_string(id: impl Into<String>) -> Self {
        CollectionId(id.into())
    }

    /// Id as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schema/version tag of a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Wrap a version tag
    pub fn new(tag: impl Into<String>) -> Self {
        VersionId(tag.into())
    }

    /// Tag as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization principal attached to a request
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a principal string
    pub fn new(principal: impl Into<String>) -> Self {
        Identity(principal.into())
    }

    /// Parse an optional principal; empty or whitespace-only input is anonymous
    pub fn parse_optional(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Identity(trimmed.to_string()))
        }
    }

    /// Principal as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key space within the store
///
/// The catalog holds collection descriptions; each collection id owns its
/// own document space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Space {
    /// Collection descriptions
    Catalog,
    /// Documents of one collection
    Documents(CollectionId),
}

/// Composite storage key
///
/// Ordering is space first, then name, so prefix scans within a space are
/// contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    /// Key space
    pub space: Space,
    /// Name within the space
    pub name: String,
}

impl Key {
    /// Create a key in the given space
    pub fn new(space: Space, name: impl Into<String>) -> Self {
        Key {
            space,
            name: name.into(),
        }
    }

    /// Catalog key of a collection description
    pub fn catalog(id: &CollectionId) -> Self {
        Key::new(Space::Catalog, format!("collection/{}", id))
    }

    /// Prefix covering every collection description
    pub fn catalog_prefix() -> Self {
        Key::new(Space::Catalog, "collection/")
    }

    /// Key of a document inside a collection
    pub fn document(collection: &CollectionId, doc_id: &str) -> Self {
        Key::new(Space::Documents(collection.clone()), doc_id)
    }

    /// Prefix covering every document of a collection
    pub fn documents_prefix(collection: &CollectionId) -> Self {
        Key::new(Space::Documents(collection.clone()), "")
    }

    /// Whether this key lies under `prefix` (same space, name prefix match)
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.space == prefix.space && self.name.starts_with(&prefix.name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.space {
            Space::Catalog => write!(f, "catalog:{}", self.name),
            Space::Documents(id) => write!(f, "docs[{}]:{}", id, self.name),
        }
    }
}

/// A stored value together with the commit version that wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Stored document
    pub value: Document,
    /// Commit version
    pub version: u64,
}

impl VersionedValue {
    /// Create a versioned value
    pub fn new(value: Document, version: u64) -> Self {
        VersionedValue { value, version }
    }
}
