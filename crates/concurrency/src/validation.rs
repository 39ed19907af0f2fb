//! Transaction validation for OCC
//!
//! Rules:
//! - First-committer-wins based on the READ-SET, not the write-set
//! - Blind writes (write without read) do NOT conflict
//! - A key written after the transaction's snapshot version conflicts if the
//!   transaction read it, whether the write was a put or a delete
//! - A prefix scanned by the transaction conflicts if any key under it was
//!   written after the snapshot version (phantom inserts and deletes)
//! - Write skew across disjoint keys is allowed

use crate::transaction::{CommitError, TransactionContext};
use std::collections::{BTreeSet, HashMap};
use tessera_core::traits::Storage;
use tessera_core::types::Key;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A key in the read set was written after the snapshot
    ReadWriteConflict {
        /// The key that has a conflict
        key: Key,
        /// Version recorded in read_set when read (0 = absent)
        read_version: u64,
        /// Version of the latest write at validation time
        current_version: u64,
    },

    /// A scanned prefix gained, lost or changed a key after the snapshot
    PhantomConflict {
        /// The scanned prefix
        prefix: Key,
        /// Snapshot version of the transaction
        snapshot_version: u64,
    },
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                key,
                read_version,
                current_version,
            } => write!(
                f,
                "key {} changed (read at version {}, now {})",
                key, read_version, current_version
            ),
            ConflictType::PhantomConflict {
                prefix,
                snapshot_version,
            } => write!(
                f,
                "prefix {} modified after version {}",
                prefix, snapshot_version
            ),
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult::default()
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// One-line summary naming the first conflict
    pub fn describe(&self) -> String {
        match self.conflicts.first() {
            None => "no conflicts".to_string(),
            Some(first) if self.conflicts.len() == 1 => first.to_string(),
            Some(first) => format!("{} (+{} more)", first, self.conflicts.len() - 1),
        }
    }
}

/// Validate the read-set against current storage state
///
/// Every read version is <= `snapshot_version`, so any write after the
/// snapshot means the value the transaction saw is stale.
pub fn validate_read_set<S: Storage + ?Sized>(
    read_set: &HashMap<Key, u64>,
    snapshot_version: u64,
    store: &S,
) -> Result<ValidationResult, CommitError> {
    let mut result = ValidationResult::ok();
    for (key, read_version) in read_set {
        let current_version = store
            .latest_version(key)
            .map_err(|e| CommitError::Storage(format!("key {}: {}", key, e)))?;
        if current_version > snapshot_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }
    Ok(result)
}

/// Validate scanned prefixes against current storage state
pub fn validate_prefix_reads<S: Storage + ?Sized>(
    prefixes: &BTreeSet<Key>,
    snapshot_version: u64,
    store: &S,
) -> Result<ValidationResult, CommitError> {
    let mut result = ValidationResult::ok();
    for prefix in prefixes {
        let modified = store
            .prefix_modified_since(prefix, snapshot_version)
            .map_err(|e| CommitError::Storage(format!("prefix {}: {}", prefix, e)))?;
        if modified {
            result.conflicts.push(ConflictType::PhantomConflict {
                prefix: prefix.clone(),
                snapshot_version,
            });
        }
    }
    Ok(result)
}

/// Validate a complete transaction against current storage state
pub fn validate_transaction<S: Storage + ?Sized>(
    txn: &TransactionContext,
    store: &S,
) -> Result<ValidationResult, CommitError> {
    let snapshot_version = txn.start_version();
    let mut result = validate_read_set(txn.read_set(), snapshot_version, store)?;
    result.merge(validate_prefix_reads(
        txn.prefix_reads(),
        snapshot_version,
        store,
    )?);
    Ok(result)
}
