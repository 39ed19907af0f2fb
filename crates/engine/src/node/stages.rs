//! Bootstrap stages
//!
//! Each stage owns what it started and knows how to release it. The node
//! starts them in order (storage, network, api) and on failure releases the
//! started ones in reverse.

use crate::config::{ApiConfig, StorageMode, ValidatedNetwork};
use crate::api_pool::ApiPool;
use crate::replication::{PeerConnector, ReplicationScheduler};
use crate::transactions::TransactionRegistry;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_concurrency::TransactionManager;
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_core::traits::Storage;
use tessera_durability::wal::Wal;
use tessera_storage::ShardedStore;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Write-ahead log file inside the data directory
pub const WAL_FILE_NAME: &str = "tessera.wal";

/// Lock file guarding the data directory
pub const LOCK_FILE_NAME: &str = "tessera.lock";

/// Wrap a stage failure so the message names the stage
pub(crate) fn stage_error(stage: &'static str, err: TesseraError) -> TesseraError {
    TesseraError::Bootstrap {
        stage,
        reason: err.to_string(),
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Started storage: the transaction registry plus the directory lock
pub(crate) struct StorageStage {
    pub(crate) registry: Arc<TransactionRegistry>,
    pub(crate) mode: StorageMode,
    lock_file: Mutex<Option<File>>,
}

impl StorageStage {
    /// Open in-memory or persistent storage and replay the WAL
    pub(crate) fn start(
        mode: &StorageMode,
        sync_on_commit: bool,
        max_retries: u32,
    ) -> TesseraResult<Self> {
        match mode {
            StorageMode::InMemory => {
                let registry = TransactionRegistry::new(
                    TransactionManager::new(0),
                    Arc::new(ShardedStore::new()),
                    None,
                    max_retries,
                );
                info!(target: "tessera::node", mode = "in-memory", "storage started");
                Ok(StorageStage {
                    registry: Arc::new(registry),
                    mode: mode.clone(),
                    lock_file: Mutex::new(None),
                })
            }
            StorageMode::Persistent(dir) => Self::open_persistent(dir, sync_on_commit, max_retries),
        }
    }

    fn open_persistent(dir: &Path, sync_on_commit: bool, max_retries: u32) -> TesseraResult<Self> {
        std::fs::create_dir_all(dir)?;
        let lock_file = acquire_lock(dir)?;

        let (wal, records) = Wal::open(dir.join(WAL_FILE_NAME), sync_on_commit)?;
        let store = Arc::new(ShardedStore::new());
        let mut version = 0;
        let mut max_txn_id = 0;
        let mut writes = 0usize;
        for record in &records {
            store.apply_batch(&record.writes, record.version)?;
            version = version.max(record.version);
            max_txn_id = max_txn_id.max(record.txn_id);
            writes += record.writes.len();
        }

        info!(
            target: "tessera::node",
            path = %dir.display(),
            txns_replayed = records.len(),
            writes_applied = writes,
            final_version = version,
            "storage started"
        );

        let registry = TransactionRegistry::new(
            TransactionManager::with_txn_id(version, max_txn_id),
            store,
            Some(wal),
            max_retries,
        );
        Ok(StorageStage {
            registry: Arc::new(registry),
            mode: StorageMode::Persistent(dir.to_path_buf()),
            lock_file: Mutex::new(Some(lock_file)),
        })
    }

    /// Discard live transactions, flush the WAL and drop the directory lock
    pub(crate) fn release(&self) {
        self.registry.discard_all();
        if let Err(e) = self.registry.sync_wal() {
            warn!(target: "tessera::node", error = %e, "final WAL sync failed");
        }
        if let Some(file) = self.lock_file.lock().take() {
            if let Err(e) = fs2::FileExt::unlock(&file) {
                warn!(target: "tessera::node", error = %e, "failed to unlock data directory");
            }
        }
        debug!(target: "tessera::node", mode = self.mode.name(), "storage released");
    }
}

fn acquire_lock(dir: &Path) -> TesseraResult<File> {
    let lock_path: PathBuf = dir.join(LOCK_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| TesseraError::storage(format!("failed to open lock file: {}", e)))?;
    fs2::FileExt::try_lock_exclusive(&file).map_err(|_| {
        TesseraError::storage(format!(
            "data directory '{}' is already in use by another node",
            dir.display()
        ))
    })?;
    Ok(file)
}

// ============================================================================
// Network
// ============================================================================

/// Started networking: listener plus the peer reconnect tasks
pub(crate) struct NetworkStage {
    pub(crate) scheduler: ReplicationScheduler,
    runtime: Mutex<Option<Runtime>>,
}

impl NetworkStage {
    /// Build the replication runtime, listen, and spawn peer tasks
    pub(crate) fn start(
        network: &ValidatedNetwork,
        connector: Arc<dyn PeerConnector>,
    ) -> TesseraResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tessera-p2p")
            .enable_all()
            .build()
            .map_err(|e| TesseraError::internal(format!("failed to build p2p runtime: {}", e)))?;

        if let Err(e) = connector.listen(&network.listen) {
            runtime.shutdown_background();
            return Err(e.into());
        }

        let scheduler = ReplicationScheduler::spawn(
            runtime.handle(),
            connector,
            network.peers.clone(),
            network.schedule.clone(),
        );
        info!(
            target: "tessera::node",
            listen = network.listen.len(),
            peers = scheduler.peer_count(),
            "network started"
        );
        Ok(NetworkStage {
            scheduler,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Cancel peer tasks and stop the runtime without blocking
    pub(crate) fn stop(&self) {
        self.scheduler.shutdown();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            debug!(target: "tessera::node", "network stopped");
        }
    }
}

impl Drop for NetworkStage {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// API
// ============================================================================

/// Start the request-serving pool
pub(crate) fn start_api(api: &ApiConfig) -> TesseraResult<ApiPool> {
    let pool = ApiPool::new(api.workers, api.queue_depth)?;
    info!(
        target: "tessera::node",
        workers = api.workers,
        queue_depth = api.queue_depth,
        "api started"
    );
    Ok(pool)
}
