//! Write-ahead log for persistent nodes
//!
//! Every committed transaction is appended as one [`WalRecord`] before its
//! writes are applied to the in-memory store. On open the log is replayed
//! from the beginning; a torn or corrupt tail (a crash mid-append) ends the
//! replay and is truncated away so later appends start from a clean offset.
//!
//! ## Durability
//!
//! - `sync_on_commit == true`: flush + fsync after every append
//! - `sync_on_commit == false`: flush to OS buffers only; `sync()` is called
//!   at shutdown
//!
//! ## Failed appends
//!
//! A record is either fully in the log or not at all. When an append fails
//! the file is cut back to the end of the last good record. If that cut
//! fails too, the log is poisoned and refuses every further append, since a
//! later record written after torn bytes would be lost on replay.

use crate::encoding::{decode_record, encode_record};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tessera_core::error::TesseraError;
use tessera_core::traits::WriteOp;
use thiserror::Error;
use tracing::{debug, error, warn};

/// WAL errors
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying file I/O failed
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be encoded
    #[error("WAL serialization error: {0}")]
    Serialization(String),

    /// Record bytes do not form a valid record
    #[error("WAL corruption at offset {offset}: {reason}")]
    Corruption {
        /// File offset of the bad record
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// The buffer ends before the record does
    #[error("incomplete WAL record at offset {offset}")]
    Incomplete {
        /// File offset of the partial record
        offset: u64,
    },

    /// A failed append could not be rolled back
    #[error("WAL is unusable after a failed append at offset {offset}")]
    Poisoned {
        /// End of the last intact record
        offset: u64,
    },
}

impl From<WalError> for TesseraError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(io) => TesseraError::Io(io),
            WalError::Serialization(msg) => TesseraError::Serialization(msg),
            other => TesseraError::storage(other.to_string()),
        }
    }
}

/// One committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Transaction that produced the batch
    pub txn_id: u64,
    /// Commit version assigned to every write
    pub version: u64,
    /// Writes in key order; `None` deletes
    pub writes: Vec<WriteOp>,
}

/// File operations the log needs beyond [`Write`]
pub trait LogFile: Write + Send {
    /// Cut the file to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flush file contents to stable storage
    fn sync_data(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }
}

/// Append-only log file
pub struct Wal<F: LogFile = File> {
    path: PathBuf,
    file: F,
    sync_on_commit: bool,
    size: u64,
    poisoned: bool,
}

impl Wal<File> {
    /// Open (or create) the log at `path` and replay it
    ///
    /// Returns the log positioned for appends plus every intact record in
    /// file order.
    pub fn open<P: AsRef<Path>>(
        path: P,
        sync_on_commit: bool,
    ) -> Result<(Self, Vec<WalRecord>), WalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (records, valid_len) = replay(&bytes);

        if (valid_len as usize) < bytes.len() {
            warn!(
                target: "tessera::wal",
                path = %path.display(),
                discarded = bytes.len() - valid_len as usize,
                "truncating torn WAL tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        debug!(target: "tessera::wal", path = %path.display(), records = records.len(), "WAL replayed");

        Ok((Wal::from_parts(path, file, valid_len, sync_on_commit), records))
    }
}

impl<F: LogFile> Wal<F> {
    fn from_parts(path: PathBuf, file: F, size: u64, sync_on_commit: bool) -> Self {
        Wal {
            path,
            file,
            sync_on_commit,
            size,
            poisoned: false,
        }
    }

    /// Append a committed batch
    ///
    /// On error nothing of the record remains in the file.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned { offset: self.size });
        }
        let encoded = encode_record(record)?;
        match self.write_record(&encoded) {
            Ok(()) => {
                self.size += encoded.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.roll_back(&e);
                Err(e)
            }
        }
    }

    fn write_record(&mut self, encoded: &[u8]) -> Result<(), WalError> {
        self.file.write_all(encoded)?;
        self.file.flush()?;
        if self.sync_on_commit {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn roll_back(&mut self, cause: &WalError) {
        match self.file.truncate(self.size) {
            Ok(()) => warn!(
                target: "tessera::wal",
                offset = self.size,
                error = %cause,
                "WAL append failed, partial record removed"
            ),
            Err(e) => {
                self.poisoned = true;
                error!(
                    target: "tessera::wal",
                    offset = self.size,
                    error = %e,
                    "WAL append failed and could not be rolled back"
                );
            }
        }
    }

    /// Flush and fsync the file
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Whether a failed append left the log unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<F: LogFile> Drop for Wal<F> {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

/// Decode every intact record; returns them and the length of the valid prefix
fn replay(bytes: &[u8]) -> (Vec<WalRecord>, u64) {
    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        match decode_record(&bytes[offset..], offset as u64) {
            Ok((record, consumed)) => {
                records.push(record);
                offset += consumed;
            }
            Err(e) => {
                warn!(target: "tessera::wal", error = %e, "WAL replay stopped");
                break;
            }
        }
    }
    (records, offset as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tessera_core::types::{CollectionId, Key};

    fn record(txn_id: u64, version: u64) -> WalRecord {
        let coll = CollectionId::from_string("c");
        WalRecord {
            txn_id,
            version,
            writes: vec![(Key::document(&coll, &format!("d{}", txn_id)), Some(json!(txn_id)))],
        }
    }

    #[test]
    fn test_open_empty() {
        let dir = TempDir::new().unwrap();
        let (wal, records) = Wal::open(dir.path().join("tessera.wal"), true).unwrap();
        assert!(records.is_empty());
        assert_eq!(wal.size(), 0);
    }

    #[test]
    fn test_append_then_reopen_replays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.wal");
        {
            let (mut wal, _) = Wal::open(&path, false).unwrap();
            wal.append(&record(1, 1)).unwrap();
            wal.append(&record(2, 2)).unwrap();
        }
        let (_, records) = Wal::open(&path, false).unwrap();
        assert_eq!(records, vec![record(1, 1), record(2, 2)]);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.wal");
        let good_len = {
            let (mut wal, _) = Wal::open(&path, true).unwrap();
            wal.append(&record(1, 1)).unwrap();
            wal.size()
        };
        // simulate a crash mid-append
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0x40, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let (mut wal, records) = Wal::open(&path, true).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(wal.size(), good_len);

        wal.append(&record(2, 2)).unwrap();
        drop(wal);
        let (_, records) = Wal::open(&path, true).unwrap();
        assert_eq!(records.len(), 2);
    }

    /// In-memory log file that can tear a write or refuse to truncate
    #[derive(Clone, Default)]
    struct FaultyFile {
        data: Arc<Mutex<Vec<u8>>>,
        tear_next_write: Arc<AtomicBool>,
        refuse_truncate: Arc<AtomicBool>,
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.tear_next_write.swap(false, Ordering::SeqCst) {
                self.data.lock().extend_from_slice(&buf[..buf.len() / 2]);
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.data.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for FaultyFile {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.refuse_truncate.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only"));
            }
            self.data.lock().truncate(len as usize);
            Ok(())
        }

        fn sync_data(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn faulty_wal() -> (Wal<FaultyFile>, FaultyFile) {
        let file = FaultyFile::default();
        let wal = Wal::from_parts(PathBuf::from("mem.wal"), file.clone(), 0, true);
        (wal, file)
    }

    #[test]
    fn test_failed_append_leaves_no_partial_record() {
        let (mut wal, file) = faulty_wal();
        wal.append(&record(1, 1)).unwrap();
        let good_len = wal.size();

        file.tear_next_write.store(true, Ordering::SeqCst);
        assert!(matches!(wal.append(&record(2, 2)), Err(WalError::Io(_))));
        assert_eq!(wal.size(), good_len);
        assert_eq!(file.data.lock().len() as u64, good_len);
        assert!(!wal.is_poisoned());

        wal.append(&record(3, 3)).unwrap();
        let (records, valid_len) = replay(&file.data.lock());
        assert_eq!(records, vec![record(1, 1), record(3, 3)]);
        assert_eq!(valid_len, wal.size());
    }

    #[test]
    fn test_unrecoverable_append_poisons_the_log() {
        let (mut wal, file) = faulty_wal();
        wal.append(&record(1, 1)).unwrap();

        file.tear_next_write.store(true, Ordering::SeqCst);
        file.refuse_truncate.store(true, Ordering::SeqCst);
        assert!(wal.append(&record(2, 2)).is_err());
        assert!(wal.is_poisoned());

        let err = wal.append(&record(3, 3)).unwrap_err();
        assert!(matches!(err, WalError::Poisoned { .. }));
        let err: TesseraError = err.into();
        assert_eq!(err.kind(), tessera_core::error::ErrorKind::Storage);

        let (records, _) = replay(&file.data.lock());
        assert_eq!(records, vec![record(1, 1)]);
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tessera.wal");
        let (wal, _) = Wal::open(&path, true).unwrap();
        assert!(wal.path().exists());
    }

    #[test]
    fn test_wal_error_maps_to_storage_kind() {
        let err: TesseraError = WalError::Corruption {
            offset: 9,
            reason: "bad".into(),
        }
        .into();
        assert_eq!(err.kind(), tessera_core::error::ErrorKind::Storage);
    }
}
