//! Transaction registry and retry wrapper
//!
//! The registry owns every live [`TransactionContext`] of a node, keyed by
//! [`TxnId`]. Each context sits behind its own mutex so operations on
//! different transactions never contend; only commits serialize, inside
//! [`TransactionManager::commit`].
//!
//! Lifecycle of an id:
//!
//! ```text
//! open -> Active --commit ok--> Committed   (removed, remembered)
//!           |     --conflict--> Conflicted  (stays registered until discard)
//!           |     --wal/io----> Aborted     (stays registered until discard)
//!           +------discard----> Discarded   (removed, remembered)
//! ```
//!
//! Finished ids are remembered in a bounded log so late calls get
//! `InvalidTransactionState` naming the final state rather than "unknown".

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_concurrency::{CommitError, TransactionContext, TransactionManager, TransactionStatus};
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::types::TxnId;
use tessera_durability::wal::Wal;
use tessera_storage::ShardedStore;
use tracing::{debug, info, warn};

/// Finished ids remembered for diagnostics
pub const FINISHED_LOG_CAPACITY: usize = 4096;

/// Commits between version-chain pruning passes
const GC_EVERY_COMMITS: u64 = 64;

/// Bounded memory of finished transactions
#[derive(Debug, Default)]
struct FinishedLog {
    order: VecDeque<TxnId>,
    states: HashMap<TxnId, &'static str>,
}

impl FinishedLog {
    fn record(&mut self, txn_id: TxnId, state: &'static str) {
        if self.states.insert(txn_id, state).is_none() {
            self.order.push_back(txn_id);
        }
        while self.order.len() > FINISHED_LOG_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.states.remove(&old);
            }
        }
    }

    fn state(&self, txn_id: TxnId) -> Option<&'static str> {
        self.states.get(&txn_id).copied()
    }
}

/// Point-in-time view of one live transaction
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Transaction id
    pub txn_id: TxnId,
    /// Whether writes are rejected
    pub read_only: bool,
    /// Snapshot version
    pub start_version: u64,
    /// Status name ("active", "conflicted", ...)
    pub status: String,
    /// Buffered puts
    pub pending_puts: usize,
    /// Buffered deletes
    pub pending_deletes: usize,
    /// Keys in the read set
    pub reads: usize,
    /// Milliseconds since open
    pub elapsed_ms: u64,
}

type SharedTxn = Arc<Mutex<TransactionContext>>;

struct LiveTxn {
    start_version: u64,
    ctx: SharedTxn,
}

/// Live transactions of one node
pub struct TransactionRegistry {
    manager: TransactionManager,
    store: Arc<ShardedStore>,
    wal: Option<Mutex<Wal>>,
    live: dashmap::DashMap<TxnId, LiveTxn>,
    finished: Mutex<FinishedLog>,
    /// Held shared while opening, exclusive while pruning, so no snapshot
    /// is taken between computing the prune floor and pruning.
    gc_gate: RwLock<()>,
    commits: AtomicU64,
    max_retries: u32,
}

impl TransactionRegistry {
    /// Create a registry over `store`
    ///
    /// `manager` must already reflect the store's version and the highest
    /// replayed transaction id.
    pub fn new(
        manager: TransactionManager,
        store: Arc<ShardedStore>,
        wal: Option<Wal>,
        max_retries: u32,
    ) -> Self {
        TransactionRegistry {
            manager,
            store,
            wal: wal.map(Mutex::new),
            live: dashmap::DashMap::new(),
            finished: Mutex::new(FinishedLog::default()),
            gc_gate: RwLock::new(()),
            commits: AtomicU64::new(0),
            max_retries,
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<ShardedStore> {
        &self.store
    }

    /// Latest committed version
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Conflict retries per logical operation
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of registered (not yet finished) transactions
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn begin(&self, read_only: bool) -> (TxnId, SharedTxn) {
        let _gate = self.gc_gate.read();
        let txn_id = self.manager.next_txn_id();
        let ctx = TransactionContext::new(txn_id, read_only, Box::new(self.store.snapshot()));
        let start_version = ctx.start_version();
        let shared = Arc::new(Mutex::new(ctx));
        self.live.insert(
            txn_id,
            LiveTxn {
                start_version,
                ctx: Arc::clone(&shared),
            },
        );
        (txn_id, shared)
    }

    /// Open a transaction at the current snapshot
    pub fn open(&self, read_only: bool) -> TxnId {
        let (txn_id, shared) = self.begin(read_only);
        debug!(
            target: "tessera::txn",
            txn_id = %txn_id,
            read_only,
            start_version = shared.lock().start_version(),
            "transaction opened"
        );
        txn_id
    }

    fn lookup(&self, txn_id: TxnId) -> TesseraResult<SharedTxn> {
        if let Some(entry) = self.live.get(&txn_id) {
            return Ok(Arc::clone(&entry.value().ctx));
        }
        let state = self.finished.lock().state(txn_id).unwrap_or("unknown");
        Err(TesseraError::invalid_txn_state(txn_id, state))
    }

    fn finish(&self, txn_id: TxnId, state: &'static str) {
        self.live.remove(&txn_id);
        self.finished.lock().record(txn_id, state);
    }

    /// Run `f` against a registered transaction
    pub fn with_txn<T>(
        &self,
        txn_id: TxnId,
        f: impl FnOnce(&mut TransactionContext) -> TesseraResult<T>,
    ) -> TesseraResult<T> {
        let shared = self.lookup(txn_id)?;
        let mut txn = shared.lock();
        f(&mut txn)
    }

    /// Snapshot of a registered transaction's state
    pub fn info(&self, txn_id: TxnId) -> TesseraResult<TransactionInfo> {
        let shared = self.lookup(txn_id)?;
        let txn = shared.lock();
        let pending = txn.pending_operations();
        Ok(TransactionInfo {
            txn_id,
            read_only: txn.is_read_only(),
            start_version: txn.start_version(),
            status: txn.status().name().to_string(),
            pending_puts: pending.puts,
            pending_deletes: pending.deletes,
            reads: txn.read_count(),
            elapsed_ms: u64::try_from(txn.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn commit_locked(&self, txn: &mut TransactionContext) -> TesseraResult<u64> {
        let result = self
            .manager
            .commit(txn, self.store.as_ref(), self.wal.as_ref());
        match result {
            Ok(version) => {
                self.finish(txn.txn_id(), TransactionStatus::Committed.name());
                if self.commits.fetch_add(1, Ordering::Relaxed) % GC_EVERY_COMMITS
                    == GC_EVERY_COMMITS - 1
                {
                    self.prune();
                }
                Ok(version)
            }
            Err(e) => {
                if let CommitError::ValidationFailed { .. } = &e {
                    debug!(target: "tessera::txn", txn_id = %txn.txn_id(), error = %e, "commit conflicted");
                } else {
                    warn!(target: "tessera::txn", txn_id = %txn.txn_id(), error = %e, "commit failed");
                }
                Err(e.into())
            }
        }
    }

    /// Commit a registered transaction
    ///
    /// Returns the commit version. On conflict the transaction stays
    /// registered as conflicted and must be discarded.
    pub fn commit(&self, txn_id: TxnId) -> TesseraResult<u64> {
        let shared = self.lookup(txn_id)?;
        let mut txn = shared.lock();
        self.commit_locked(&mut txn)
    }

    /// Discard a registered transaction
    ///
    /// Discarding twice fails with `InvalidTransactionState` and changes
    /// nothing.
    pub fn discard(&self, txn_id: TxnId) -> TesseraResult<()> {
        let shared = self.lookup(txn_id)?;
        let mut txn = shared.lock();
        txn.discard()?;
        self.finish(txn_id, TransactionStatus::Discarded.name());
        debug!(target: "tessera::txn", txn_id = %txn_id, "transaction discarded");
        Ok(())
    }

    /// Discard every live transaction (shutdown)
    pub fn discard_all(&self) -> usize {
        let ids: Vec<TxnId> = self.live.iter().map(|e| *e.key()).collect();
        let mut discarded = 0;
        for txn_id in ids {
            if self.discard(txn_id).is_ok() {
                discarded += 1;
            }
        }
        if discarded > 0 {
            info!(target: "tessera::txn", discarded, "discarded live transactions");
        }
        discarded
    }

    /// Run `f` in a fresh transaction and commit, retrying on conflict
    ///
    /// `f` is reapplied in a new transaction up to `max_retries` times.
    /// Once the bound is exhausted a `Conflict` error naming the attempt
    /// count is returned. Errors from `f` itself are not retried.
    pub fn run<T>(
        &self,
        read_only: bool,
        mut f: impl FnMut(&mut TransactionContext) -> TesseraResult<T>,
    ) -> TesseraResult<T> {
        let attempts = self.max_retries.saturating_add(1);
        let mut last_conflict = None;

        for attempt in 1..=attempts {
            let (txn_id, shared) = self.begin(read_only);
            let mut txn = shared.lock();

            let value = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    if txn.discard().is_ok() {
                        self.finish(txn_id, TransactionStatus::Discarded.name());
                    }
                    return Err(e);
                }
            };

            match self.commit_locked(&mut txn) {
                Ok(_) => return Ok(value),
                Err(e) if e.is_conflict() => {
                    let _ = txn.discard();
                    self.finish(txn_id, TransactionStatus::Discarded.name());
                    debug!(
                        target: "tessera::txn",
                        txn_id = %txn_id,
                        attempt,
                        attempts,
                        "retrying after conflict"
                    );
                    last_conflict = Some((txn_id, e));
                }
                Err(e) => {
                    let _ = txn.discard();
                    self.finish(txn_id, TransactionStatus::Discarded.name());
                    return Err(e);
                }
            }
        }

        match last_conflict {
            Some((txn_id, e)) => Err(TesseraError::Conflict {
                txn_id,
                reason: format!("{} (gave up after {} attempts)", conflict_reason(&e), attempts),
            }),
            None => Err(TesseraError::internal(
                "retry loop exited without returning a result",
            )),
        }
    }

    /// Prune version chains no live snapshot can read
    pub fn prune(&self) {
        let _gate = self.gc_gate.write();
        let floor = self
            .live
            .iter()
            .map(|e| e.value().start_version)
            .min()
            .unwrap_or_else(|| self.manager.current_version());
        self.store.gc(floor);
        debug!(target: "tessera::txn", floor, "pruned version chains");
    }

    /// Flush the WAL to disk
    pub fn sync_wal(&self) -> TesseraResult<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        Ok(())
    }
}

fn conflict_reason(e: &TesseraError) -> &str {
    match e {
        TesseraError::Conflict { reason, .. } => reason,
        _ => "conflict",
    }
}
