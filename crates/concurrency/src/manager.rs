//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins)
//! 2. WAL writing (durability, persistent nodes only)
//! 3. Storage application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. take the commit lock
//! 2. validate read set and prefix reads -> Committed | Conflicted
//! 3. no writes? release and return the current version
//! 4. commit_version = current + 1
//! 5. append WalRecord (DURABILITY POINT)
//! 6. apply writes to storage at commit_version
//! 7. publish commit_version, release the lock
//! ```
//!
//! The commit lock covers validation and apply only. Snapshot reads never
//! take it, so readers never wait on writers.

use crate::transaction::{CommitError, TransactionContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::traits::Storage;
use tessera_core::types::TxnId;
use tessera_durability::wal::{Wal, WalRecord};
use tracing::{debug, error};

/// Manages transaction ids and atomic commits
///
/// All keys of one transaction get the same commit version; the global
/// version advances by one per committed transaction that wrote anything.
pub struct TransactionManager {
    version: AtomicU64,
    next_txn_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a new transaction manager
    ///
    /// `initial_version` is the store's version after WAL replay.
    pub fn new(initial_version: u64) -> Self {
        Self::with_txn_id(initial_version, 0)
    }

    /// Create a manager whose first issued id is `max_txn_id + 1`
    ///
    /// Used after replay so ids in the WAL are never reused.
    pub fn with_txn_id(initial_version: u64, max_txn_id: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(max_txn_id + 1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Allocate the next transaction id (never 0)
    pub fn next_txn_id(&self) -> TxnId {
        TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - Ok(commit_version) on success (the current version for
    ///   transactions with nothing to write)
    /// - Err(CommitError) if validation, storage or the WAL fails; the
    ///   transaction is left Conflicted or Aborted and nothing is applied
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
        wal: Option<&Mutex<Wal>>,
    ) -> Result<u64, CommitError> {
        let _guard = self.commit_lock.lock();

        txn.commit(store)?;

        if !txn.has_pending_operations() {
            return Ok(self.current_version());
        }

        let commit_version = self.current_version() + 1;
        let writes = txn.writes();

        if let Some(wal) = wal {
            let record = WalRecord {
                txn_id: txn.txn_id().as_u64(),
                version: commit_version,
                writes,
            };
            if let Err(e) = wal.lock().append(&record) {
                txn.mark_aborted(format!("WAL append failed: {}", e));
                return Err(CommitError::WalError(e.to_string()));
            }
            self.apply(txn, store, &record.writes, commit_version)?;
        } else {
            self.apply(txn, store, &writes, commit_version)?;
        }

        self.version.store(commit_version, Ordering::Release);
        debug!(
            target: "tessera::txn",
            txn_id = %txn.txn_id(),
            commit_version,
            "transaction committed"
        );
        Ok(commit_version)
    }

    fn apply<S: Storage + ?Sized>(
        &self,
        txn: &TransactionContext,
        store: &S,
        writes: &[tessera_core::traits::WriteOp],
        commit_version: u64,
    ) -> Result<(), CommitError> {
        store.apply_batch(writes, commit_version).map_err(|e| {
            error!(
                target: "tessera::txn",
                txn_id = %txn.txn_id(),
                commit_version,
                error = %e,
                "storage apply failed after WAL append"
            );
            CommitError::Storage(e.to_string())
        })
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}
