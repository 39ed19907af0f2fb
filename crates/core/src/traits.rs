//! Core traits for storage and snapshot abstraction
//!
//! This module defines the Storage and SnapshotView traits that keep the
//! concurrency layer independent of the storage engine behind it.

use crate::error::TesseraResult;
use crate::types::{Document, Key, VersionedValue};

/// One buffered write: `Some(doc)` stores, `None` deletes
pub type WriteOp = (Key, Option<Document>);

/// Storage abstraction for the node's single shared mutable resource
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Get current value for key (latest committed version)
    ///
    /// Returns None if the key does not exist or was deleted.
    fn get(&self, key: &Key) -> TesseraResult<Option<VersionedValue>>;

    /// Get the value visible at or before `max_version`
    fn get_versioned(&self, key: &Key, max_version: u64) -> TesseraResult<Option<VersionedValue>>;

    /// Version of the latest write (including deletes) to `key`, 0 if never written
    ///
    /// Used by commit validation: a delete after a read is a conflict even
    /// though the key no longer has a value.
    fn latest_version(&self, key: &Key) -> TesseraResult<u64>;

    /// Scan live keys with the given prefix at or before `max_version`
    ///
    /// Results are sorted by key order.
    fn scan_prefix(&self, prefix: &Key, max_version: u64) -> TesseraResult<Vec<(Key, VersionedValue)>>;

    /// Whether any key under `prefix` was written after `since_version`
    fn prefix_modified_since(&self, prefix: &Key, since_version: u64) -> TesseraResult<bool>;

    /// Apply a batch of writes atomically at `version`
    ///
    /// All keys of one transaction get the same commit version.
    fn apply_batch(&self, writes: &[WriteOp], version: u64) -> TesseraResult<()>;

    /// Get current global version
    ///
    /// Returns the highest version applied so far.
    fn current_version(&self) -> u64;
}

/// Point-in-time read view used by a transaction
///
/// A snapshot always returns committed data as of `version()` and never
/// shows writes committed afterwards.
pub trait SnapshotView: Send + Sync {
    /// Get value of key as of the snapshot version
    fn get(&self, key: &Key) -> TesseraResult<Option<VersionedValue>>;

    /// Scan keys with prefix as of the snapshot version, sorted by key
    fn scan_prefix(&self, prefix: &Key) -> TesseraResult<Vec<(Key, VersionedValue)>>;

    /// The snapshot version
    fn version(&self) -> u64;
}
