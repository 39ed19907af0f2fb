//! Error types for the tessera node
//!
//! Every failure that can cross the node boundary is a [`TesseraError`].
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Each variant maps to a stable [`ErrorKind`] so that hosts can branch on the
//! category of a failure without parsing messages.

use crate::types::TxnId;
use std::io;
use thiserror::Error;

/// Result type alias for tessera operations
pub type TesseraResult<T> = std::result::Result<T, TesseraError>;

/// Stable error categories
///
/// | Kind | Meaning |
/// |------|---------|
/// | `Validation` | Malformed configuration or request |
/// | `AlreadyInitialized` | Bootstrap called on a node that is already up |
/// | `NotReady` | Call before bootstrap completes or after shutdown began |
/// | `Conflict` | Write conflict, surfaced after the retry bound |
/// | `NotFound` | Collection / version / document miss |
/// | `AmbiguousLookup` | Name matches several versions |
/// | `Authorization` | Identity lacks access |
/// | `InvalidTransactionState` | Operation on a finished or unusable transaction |
/// | `Connection` | Peer unreachable (internal only) |
/// | `Bootstrap` | A bootstrap stage failed to start |
/// | `Storage` | Storage engine failure |
/// | `Internal` | Invariant violation |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed configuration or request
    Validation,
    /// Node already initialized
    AlreadyInitialized,
    /// Node not ready
    NotReady,
    /// Transaction write conflict
    Conflict,
    /// Entity not found
    NotFound,
    /// Lookup matched more than one entity
    AmbiguousLookup,
    /// Identity lacks access
    Authorization,
    /// Transaction in the wrong state for the operation
    InvalidTransactionState,
    /// Peer unreachable
    Connection,
    /// Bootstrap stage failure
    Bootstrap,
    /// Storage failure (including I/O and serialization)
    Storage,
    /// Internal invariant violation
    Internal,
}

impl ErrorKind {
    /// Stable code used in envelopes and dispatch responses
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::AlreadyInitialized => "AlreadyInitializedError",
            ErrorKind::NotReady => "NotReadyError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AmbiguousLookup => "AmbiguousLookupError",
            ErrorKind::Authorization => "AuthorizationError",
            ErrorKind::InvalidTransactionState => "InvalidTransactionStateError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Bootstrap => "BootstrapError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error types for the tessera node
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Malformed configuration or request
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Bootstrap was called on a node that is starting or ready
    #[error("node already initialized")]
    AlreadyInitialized,

    /// The node is not accepting calls in its current state
    #[error("node not ready: {state}")]
    NotReady {
        /// Lifecycle state at the time of the call
        state: String,
    },

    /// Write conflict detected at commit time
    #[error("transaction {txn_id} conflict: {reason}")]
    Conflict {
        /// Transaction that lost the race
        txn_id: TxnId,
        /// Conflict description
        reason: String,
    },

    /// Entity lookup miss
    #[error("{entity} not found: {name}")]
    NotFound {
        /// Kind of entity ("collection", "document", ...)
        entity: &'static str,
        /// Name or identifier that was looked up
        name: String,
    },

    /// A name matched more than one version and no version tag was given
    #[error("ambiguous lookup for collection '{name}': {candidates} versions match")]
    AmbiguousLookup {
        /// Collection name
        name: String,
        /// Number of matching versions
        candidates: usize,
    },

    /// Identity is not permitted to access the collection
    #[error("identity '{identity}' is not authorized to access collection '{collection}'")]
    Authorization {
        /// Requesting identity
        identity: String,
        /// Collection that was requested
        collection: String,
    },

    /// Operation on a transaction that is not active
    #[error("transaction {txn_id} is {state}")]
    InvalidTransactionState {
        /// Transaction identifier
        txn_id: TxnId,
        /// Observed state ("committed", "discarded", "conflicted", "unknown")
        state: String,
    },

    /// Peer unreachable
    #[error("peer {peer} unreachable: {reason}")]
    Connection {
        /// Peer address
        peer: String,
        /// Failure reason
        reason: String,
    },

    /// A bootstrap stage failed to start
    #[error("bootstrap stage '{stage}' failed: {reason}")]
    Bootstrap {
        /// Stage name ("validate", "storage", "network", "api")
        stage: &'static str,
        /// Failure reason
        reason: String,
    },

    /// Storage layer error
    #[error("storage error: {message}")]
    Storage {
        /// Failure description
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        TesseraError::Validation {
            message: message.into(),
        }
    }

    /// Create a not-ready error for the given lifecycle state
    pub fn not_ready(state: impl Into<String>) -> Self {
        TesseraError::NotReady {
            state: state.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        TesseraError::NotFound {
            entity,
            name: name.into(),
        }
    }

    /// Create an invalid-transaction-state error
    pub fn invalid_txn_state(txn_id: TxnId, state: impl Into<String>) -> Self {
        TesseraError::InvalidTransactionState {
            txn_id,
            state: state.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        TesseraError::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        TesseraError::Internal(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TesseraError::Validation { .. } => ErrorKind::Validation,
            TesseraError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            TesseraError::NotReady { .. } => ErrorKind::NotReady,
            TesseraError::Conflict { .. } => ErrorKind::Conflict,
            TesseraError::NotFound { .. } => ErrorKind::NotFound,
            TesseraError::AmbiguousLookup { .. } => ErrorKind::AmbiguousLookup,
            TesseraError::Authorization { .. } => ErrorKind::Authorization,
            TesseraError::InvalidTransactionState { .. } => ErrorKind::InvalidTransactionState,
            TesseraError::Connection { .. } => ErrorKind::Connection,
            TesseraError::Bootstrap { .. } => ErrorKind::Bootstrap,
            TesseraError::Storage { .. }
            | TesseraError::Io(_)
            | TesseraError::Serialization(_) => ErrorKind::Storage,
            TesseraError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the operation may succeed if retried in a fresh transaction
    pub fn is_conflict(&self) -> bool {
        matches!(self, TesseraError::Conflict { .. })
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(e: serde_json::Error) -> Self {
        TesseraError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = TesseraError::validation("bad address");
        let msg = err.to_string();
        assert!(msg.contains("validation error"));
        assert!(msg.contains("bad address"));
    }

    #[test]
    fn test_error_display_invalid_txn_state_names_transaction() {
        let err = TesseraError::invalid_txn_state(TxnId::new(7), "discarded");
        assert_eq!(err.to_string(), "transaction 7 is discarded");
    }

    #[test]
    fn test_error_display_bootstrap_names_stage() {
        let err = TesseraError::Bootstrap {
            stage: "network",
            reason: "listen failed".to_string(),
        };
        assert!(err.to_string().contains("'network'"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(TesseraError::AlreadyInitialized.kind(), ErrorKind::AlreadyInitialized);
        assert_eq!(TesseraError::not_ready("stopped").kind(), ErrorKind::NotReady);
        assert_eq!(
            TesseraError::not_found("collection", "Users").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TesseraError::Serialization("x".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_is_conflict() {
        let conflict = TesseraError::Conflict {
            txn_id: TxnId::new(1),
            reason: "read-write".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!TesseraError::validation("x").is_conflict());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::AlreadyInitialized,
            ErrorKind::NotReady,
            ErrorKind::Conflict,
            ErrorKind::NotFound,
            ErrorKind::AmbiguousLookup,
            ErrorKind::Authorization,
            ErrorKind::InvalidTransactionState,
            ErrorKind::Connection,
            ErrorKind::Bootstrap,
            ErrorKind::Storage,
            ErrorKind::Internal,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: TesseraError = io_err.into();
        assert!(matches!(err, TesseraError::Io(_)));
    }
}
