//! Transaction context for OCC
//!
//! TransactionContext tracks every read, prefix scan and buffered write of a
//! transaction so that it can be validated at commit time.
//!
//! ## Isolation
//!
//! Reads go to the transaction's own buffered writes first, then to the
//! snapshot taken when the transaction was opened. Nothing is visible to
//! other transactions until commit applies the write set.

use crate::validation::{validate_transaction, ValidationResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::traits::{SnapshotView, Storage, WriteOp};
use tessera_core::types::{Document, Key, TxnId};
use thiserror::Error;

/// Error type for commit failures
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    /// Read set or prefix reads were invalidated by a concurrent commit
    #[error("transaction {txn_id} aborted: {} conflict(s)", .result.conflict_count())]
    ValidationFailed {
        /// Transaction that failed validation
        txn_id: TxnId,
        /// Conflicts found
        result: ValidationResult,
    },

    /// Transaction was not in the Active state
    #[error("transaction {txn_id} is {state}")]
    InvalidState {
        /// Transaction identifier
        txn_id: TxnId,
        /// Observed state name
        state: &'static str,
    },

    /// Storage could not be read during validation
    #[error("storage error during validation: {0}")]
    Storage(String),

    /// WAL append failed; nothing was applied
    #[error("WAL error: {0}")]
    WalError(String),
}

impl From<CommitError> for TesseraError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed { txn_id, result } => TesseraError::Conflict {
                txn_id,
                reason: result.describe(),
            },
            CommitError::InvalidState { txn_id, state } => {
                TesseraError::invalid_txn_state(txn_id, state)
            }
            CommitError::Storage(msg) => TesseraError::storage(msg),
            CommitError::WalError(msg) => TesseraError::storage(format!("WAL error: {}", msg)),
        }
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Conflicted` (conflict detected)
/// - `Validating` → `Aborted` (storage or WAL failure)
/// - `Active` | `Conflicted` | `Aborted` → `Discarded`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was discarded by its owner
    Discarded,
    /// Commit lost a conflict; unusable until discarded
    Conflicted {
        /// Human-readable description of the conflict
        reason: String,
    },
    /// Commit failed for a reason other than a conflict
    Aborted {
        /// Human-readable reason
        reason: String,
    },
}

impl TransactionStatus {
    /// Lower-case state name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Validating => "validating",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Discarded => "discarded",
            TransactionStatus::Conflicted { .. } => "conflicted",
            TransactionStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Counts of buffered operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Buffered puts
    pub puts: usize,
    /// Buffered deletes
    pub deletes: usize,
}

/// Transaction context for OCC
///
/// # Read tracking
///
/// - `read_set`: every key read from the snapshot, with the version read
///   (0 when absent)
/// - `prefix_reads`: every prefix scanned from the snapshot, so that keys
///   inserted under it by concurrent commits are detected (phantoms)
///
/// Reads served from the transaction's own writes are not tracked.
pub struct TransactionContext {
    txn_id: TxnId,
    read_only: bool,
    start_version: u64,
    snapshot: Box<dyn SnapshotView>,
    read_set: HashMap<Key, u64>,
    prefix_reads: BTreeSet<Key>,
    write_set: BTreeMap<Key, Option<Document>>,
    status: TransactionStatus,
    start_time: Instant,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("read_only", &self.read_only)
            .field("start_version", &self.start_version)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("status", &self.status)
            .finish()
    }
}

impl TransactionContext {
    /// Create a transaction reading from `snapshot`
    pub fn new(txn_id: TxnId, read_only: bool, snapshot: Box<dyn SnapshotView>) -> Self {
        let start_version = snapshot.version();
        TransactionContext {
            txn_id,
            read_only,
            start_version,
            snapshot,
            read_set: HashMap::new(),
            prefix_reads: BTreeSet::new(),
            write_set: BTreeMap::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Transaction id
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Snapshot version this transaction reads at
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Whether the transaction accepts operations
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Time since the transaction was opened
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fail with `InvalidTransactionState` unless Active
    pub fn ensure_active(&self) -> TesseraResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TesseraError::invalid_txn_state(
                self.txn_id,
                self.status.name(),
            ))
        }
    }

    fn ensure_writable(&self) -> TesseraResult<()> {
        self.ensure_active()?;
        if self.read_only {
            return Err(TesseraError::validation(format!(
                "transaction {} is read-only",
                self.txn_id
            )));
        }
        Ok(())
    }

    // === Read Operations ===

    /// Read a key (read-your-writes, tracked for validation)
    pub fn get(&mut self, key: &Key) -> TesseraResult<Option<Document>> {
        self.ensure_active()?;
        if let Some(buffered) = self.write_set.get(key) {
            return Ok(buffered.clone());
        }
        let versioned = self.snapshot.get(key)?;
        self.read_set
            .insert(key.clone(), versioned.as_ref().map_or(0, |v| v.version));
        Ok(versioned.map(|v| v.value))
    }

    /// Scan a prefix (read-your-writes, tracked for phantom detection)
    ///
    /// Results are sorted by key.
    pub fn scan_prefix(&mut self, prefix: &Key) -> TesseraResult<Vec<(Key, Document)>> {
        self.ensure_active()?;
        let snapshot_results = self.snapshot.scan_prefix(prefix)?;
        for (key, vv) in &snapshot_results {
            if !self.write_set.contains_key(key) {
                self.read_set.insert(key.clone(), vv.version);
            }
        }
        self.prefix_reads.insert(prefix.clone());
        Ok(self.merge_with_writes(prefix, snapshot_results))
    }

    /// Read a key without recording it in the read set
    ///
    /// Sees the snapshot plus this transaction's buffered writes.
    pub fn view_get(&self, key: &Key) -> TesseraResult<Option<Document>> {
        self.ensure_active()?;
        if let Some(buffered) = self.write_set.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.snapshot.get(key)?.map(|v| v.value))
    }

    /// Scan a prefix without recording it for validation
    pub fn view_scan_prefix(&self, prefix: &Key) -> TesseraResult<Vec<(Key, Document)>> {
        self.ensure_active()?;
        let snapshot_results = self.snapshot.scan_prefix(prefix)?;
        Ok(self.merge_with_writes(prefix, snapshot_results))
    }

    fn merge_with_writes(
        &self,
        prefix: &Key,
        snapshot_results: Vec<(Key, tessera_core::types::VersionedValue)>,
    ) -> Vec<(Key, Document)> {
        let mut results: BTreeMap<Key, Document> = snapshot_results
            .into_iter()
            .map(|(k, vv)| (k, vv.value))
            .collect();
        for (key, value) in self.write_set.range(prefix.clone()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(doc) => {
                    results.insert(key.clone(), doc.clone());
                }
                None => {
                    results.remove(key);
                }
            }
        }
        results.into_iter().collect()
    }

    /// Version recorded for a key read from the snapshot
    pub fn get_read_version(&self, key: &Key) -> Option<u64> {
        self.read_set.get(key).copied()
    }

    // === Write Operations ===

    /// Buffer a write
    pub fn put(&mut self, key: Key, value: Document) -> TesseraResult<()> {
        self.ensure_writable()?;
        self.write_set.insert(key, Some(value));
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: Key) -> TesseraResult<()> {
        self.ensure_writable()?;
        self.write_set.insert(key, None);
        Ok(())
    }

    /// Counts of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        let deletes = self.write_set.values().filter(|v| v.is_none()).count();
        PendingOperations {
            puts: self.write_set.len() - deletes,
            deletes,
        }
    }

    /// Whether any write is buffered
    pub fn has_pending_operations(&self) -> bool {
        !self.write_set.is_empty()
    }

    /// Number of keys in the read set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of buffered writes (puts and deletes)
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    pub(crate) fn read_set(&self) -> &HashMap<Key, u64> {
        &self.read_set
    }

    pub(crate) fn prefix_reads(&self) -> &BTreeSet<Key> {
        &self.prefix_reads
    }

    /// Buffered writes in key order
    pub fn writes(&self) -> Vec<WriteOp> {
        self.write_set
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // === State Transitions ===

    /// Validate against `store` and move to Committed or Conflicted
    ///
    /// Transactions with no buffered writes never conflict: their snapshot
    /// reads were consistent and they apply nothing.
    pub fn commit<S: Storage + ?Sized>(&mut self, store: &S) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState {
                txn_id: self.txn_id,
                state: self.status.name(),
            });
        }
        self.status = TransactionStatus::Validating;

        if self.has_pending_operations() {
            let result = match validate_transaction(self, store) {
                Ok(result) => result,
                Err(e) => {
                    self.mark_aborted(e.to_string());
                    return Err(e);
                }
            };
            if !result.is_valid() {
                self.status = TransactionStatus::Conflicted {
                    reason: result.describe(),
                };
                return Err(CommitError::ValidationFailed {
                    txn_id: self.txn_id,
                    result,
                });
            }
        }

        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Mark a failed commit whose writes were never applied
    pub fn mark_aborted(&mut self, reason: String) {
        self.status = TransactionStatus::Aborted { reason };
        self.write_set.clear();
    }

    /// Discard the transaction and drop its buffered writes
    ///
    /// Allowed from Active, Conflicted and Aborted.
    pub fn discard(&mut self) -> TesseraResult<()> {
        match self.status {
            TransactionStatus::Committed
            | TransactionStatus::Discarded
            | TransactionStatus::Validating => Err(TesseraError::invalid_txn_state(
                self.txn_id,
                self.status.name(),
            )),
            _ => {
                self.status = TransactionStatus::Discarded;
                self.write_set.clear();
                self.read_set.clear();
                self.prefix_reads.clear();
                Ok(())
            }
        }
    }
}
