//! Core types and traits for Tessera
//!
//! This crate defines the foundational types used throughout the system:
//! - TxnId, CollectionId, VersionId, Identity: identifiers
//! - Key / Space: storage addressing
//! - VersionedValue: a document with its commit version
//! - Error: TesseraError and ErrorKind
//! - Traits: Storage and SnapshotView
//! - Contract: the CallResult envelope returned by boundary calls

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod traits;
pub mod types;

pub use contract::{CallResult, CallStatus};
pub use error::{ErrorKind, TesseraError, TesseraResult};
pub use traits::{SnapshotView, Storage, WriteOp};
pub use types::{CollectionId, Document, Identity, Key, Space, TxnId, VersionId, VersionedValue};
