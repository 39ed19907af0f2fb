//! Sharded MVCC storage
//!
//! DashMap sharded by key space, FxHashMap within each shard.
//!
//! # Design
//!
//! - DashMap: one shard per space (the catalog, plus one per collection)
//! - FxHashMap: O(1) lookups, fast non-crypto hash
//! - VersionChain: every write (including deletes) appends a version, so a
//!   snapshot at version V always reads the newest entry <= V
//!
//! Deletes are stored as tombstones rather than removing the chain. A
//! transaction that read a key before it was deleted must still see a newer
//! version at commit time, otherwise the delete would be invisible to
//! conflict detection.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::error::TesseraResult;
use tessera_core::traits::{SnapshotView, Storage, WriteOp};
use tessera_core::types::{Document, Key, Space, VersionedValue};
use tracing::trace;

/// One version of a key; `value == None` is a tombstone
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    value: Option<Document>,
    version: u64,
}

impl StoredEntry {
    /// Commit version of this entry
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether this entry records a delete
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    fn versioned(&self) -> Option<VersionedValue> {
        self.value
            .as_ref()
            .map(|v| VersionedValue::new(v.clone(), self.version))
    }
}

/// Version chain for MVCC
///
/// Versions are stored oldest-first; pushes append, reads scan from the back
/// for the newest version <= the requested one.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: SmallVec<[StoredEntry; 2]>,
}

impl VersionChain {
    fn new(entry: StoredEntry) -> Self {
        let mut versions = SmallVec::new();
        versions.push(entry);
        Self { versions }
    }

    /// Add a new version (must be newer than existing versions)
    #[inline]
    fn push(&mut self, entry: StoredEntry) {
        debug_assert!(
            self.latest().map_or(true, |l| l.version <= entry.version),
            "version chain must stay ordered"
        );
        self.versions.push(entry);
    }

    /// Get the entry at or before the given max_version
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredEntry> {
        self.versions.iter().rev().find(|e| e.version <= max_version)
    }

    /// Get the latest entry
    #[inline]
    pub fn latest(&self) -> Option<&StoredEntry> {
        self.versions.last()
    }

    /// Drop versions no snapshot at or above `min_version` can observe
    ///
    /// Keeps the newest entry <= min_version and everything after it.
    pub fn gc(&mut self, min_version: u64) {
        let keep_from = self
            .versions
            .iter()
            .rposition(|e| e.version <= min_version)
            .unwrap_or(0);
        if keep_from > 0 {
            self.versions.drain(..keep_from);
        }
    }

    /// True when the chain holds only a tombstone at or below `min_version`
    ///
    /// No snapshot at or above `min_version` can see such a key, and no
    /// transaction that read it is still open, so the chain can go.
    fn is_dead(&self, min_version: u64) -> bool {
        match self.versions.as_slice() {
            [only] => only.is_tombstone() && only.version <= min_version,
            _ => false,
        }
    }
}

/// Per-space shard
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) data: FxHashMap<Key, VersionChain>,
}

impl Shard {
    /// Number of keys in this shard (tombstoned keys included)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if shard is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn scan(&self, prefix: &Key, max_version: u64) -> Vec<(Key, VersionedValue)> {
        let mut results: Vec<_> = self
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter_map(|(k, chain)| {
                chain
                    .get_at_version(max_version)
                    .and_then(StoredEntry::versioned)
                    .map(|v| (k.clone(), v))
            })
            .collect();
        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        results
    }
}

/// Sharded storage - DashMap by space, HashMap within
///
/// # Thread Safety
///
/// - reads: take only a shard read guard
/// - apply_batch: locks one shard at a time
/// - the global version is bumped after every write of a batch is in place,
///   so snapshots taken at the new version see the whole batch
pub struct ShardedStore {
    shards: DashMap<Space, Shard>,
    version: AtomicU64,
}

impl ShardedStore {
    /// Create new sharded store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Get current version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of shards (spaces)
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of keys across all shards
    pub fn total_entries(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    fn push(&self, key: &Key, entry: StoredEntry) {
        let mut shard = self.shards.entry(key.space.clone()).or_default();
        if let Some(chain) = shard.data.get_mut(key) {
            chain.push(entry);
        } else {
            shard.data.insert(key.clone(), VersionChain::new(entry));
        }
    }

    fn with_chain<T>(&self, key: &Key, f: impl FnOnce(&VersionChain) -> Option<T>) -> Option<T> {
        self.shards
            .get(&key.space)
            .and_then(|shard| shard.data.get(key).and_then(f))
    }

    /// Prune version chains below `min_version`
    ///
    /// Callers must pass the oldest snapshot version still in use. Keys whose
    /// last surviving entry is a tombstone at or below the floor are removed,
    /// and shards left empty are dropped.
    pub fn gc(&self, min_version: u64) {
        let mut removed = 0usize;
        for mut shard in self.shards.iter_mut() {
            shard.data.retain(|_, chain| {
                chain.gc(min_version);
                let dead = chain.is_dead(min_version);
                removed += dead as usize;
                !dead
            });
        }
        self.shards.retain(|_, shard| !shard.is_empty());
        if removed > 0 {
            trace!(target: "tessera::storage", min_version, removed, "dead keys collected");
        }
    }

    /// Create a snapshot at the current version
    ///
    /// O(1): captures the version and an Arc to the store. Reads are resolved
    /// lazily against the version chains.
    pub fn snapshot(self: &Arc<Self>) -> ShardedSnapshot {
        ShardedSnapshot {
            version: self.version(),
            store: Arc::clone(self),
            cache: parking_lot::RwLock::new(FxHashMap::default()),
        }
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shard_count", &self.shard_count())
            .field("version", &self.version())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}

impl Storage for ShardedStore {
    fn get(&self, key: &Key) -> TesseraResult<Option<VersionedValue>> {
        Ok(self.with_chain(key, |chain| chain.latest().and_then(StoredEntry::versioned)))
    }

    fn get_versioned(&self, key: &Key, max_version: u64) -> TesseraResult<Option<VersionedValue>> {
        Ok(self.with_chain(key, |chain| {
            chain
                .get_at_version(max_version)
                .and_then(StoredEntry::versioned)
        }))
    }

    fn latest_version(&self, key: &Key) -> TesseraResult<u64> {
        Ok(self
            .with_chain(key, |chain| chain.latest().map(StoredEntry::version))
            .unwrap_or(0))
    }

    fn scan_prefix(&self, prefix: &Key, max_version: u64) -> TesseraResult<Vec<(Key, VersionedValue)>> {
        Ok(self
            .shards
            .get(&prefix.space)
            .map(|shard| shard.scan(prefix, max_version))
            .unwrap_or_default())
    }

    fn prefix_modified_since(&self, prefix: &Key, since_version: u64) -> TesseraResult<bool> {
        Ok(self
            .shards
            .get(&prefix.space)
            .map(|shard| {
                shard.data.iter().any(|(k, chain)| {
                    k.starts_with(prefix)
                        && chain.latest().map_or(false, |e| e.version > since_version)
                })
            })
            .unwrap_or(false))
    }

    fn apply_batch(&self, writes: &[WriteOp], version: u64) -> TesseraResult<()> {
        for (key, value) in writes {
            self.push(
                key,
                StoredEntry {
                    value: value.clone(),
                    version,
                },
            );
        }
        self.version.fetch_max(version, Ordering::AcqRel);
        trace!(target: "tessera::storage", version, writes = writes.len(), "batch applied");
        Ok(())
    }

    fn current_version(&self) -> u64 {
        self.version()
    }
}

// ============================================================================
// ShardedSnapshot
// ============================================================================

/// Snapshot of ShardedStore at a point in time
///
/// Holds the version captured at creation and an Arc to the store. Point
/// reads are cached so that repeated reads of a key inside one transaction
/// are stable and cheap.
pub struct ShardedSnapshot {
    version: u64,
    store: Arc<ShardedStore>,
    cache: parking_lot::RwLock<FxHashMap<Key, Option<VersionedValue>>>,
}

impl std::fmt::Debug for ShardedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedSnapshot")
            .field("version", &self.version)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl SnapshotView for ShardedSnapshot {
    fn get(&self, key: &Key) -> TesseraResult<Option<VersionedValue>> {
        if let Some(cached) = self.cache.read().get(key) {
            return Ok(cached.clone());
        }
        let result = self.store.get_versioned(key, self.version)?;
        self.cache.write().insert(key.clone(), result.clone());
        Ok(result)
    }

    fn scan_prefix(&self, prefix: &Key) -> TesseraResult<Vec<(Key, VersionedValue)>> {
        self.store.scan_prefix(prefix, self.version)
    }

    fn version(&self) -> u64 {
        self.version
    }
}
