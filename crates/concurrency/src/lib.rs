//! Optimistic concurrency control for tessera
//!
//! This crate implements snapshot-isolated transactions:
//! - TransactionContext: read/write tracking over a lazy snapshot
//! - Validation: first-committer-wins on the read set plus phantom checks
//!   on scanned prefixes
//! - TransactionManager: id allocation and the serialized commit path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{CommitError, PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{ConflictType, ValidationResult};
