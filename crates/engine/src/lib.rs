//! Node engine for Tessera
//!
//! This crate orchestrates all lower layers:
//! - Node: lifecycle (initialize, shutdown) and the operation surface
//! - Configuration: validated init config, TOML config files
//! - Transactions: registry of live transactions with bounded retry
//! - Catalog and resolution: versioned collections, access checks
//! - Replication: peer addresses, reconnect backoff, per-peer tasks
//! - API pool: bounded worker pool serving boundary requests
//!
//! The engine is the only component that knows about:
//! - Bootstrap ordering and rollback
//! - Cross-layer coordination (storage + WAL + concurrency)
//! - WAL replay on startup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod api_pool;
pub mod catalog;
pub mod config;
pub mod identity;
pub mod node;
pub mod replication;
pub mod resolver;
pub mod transactions;

pub use access::{AccessPolicy, AccessRule, RuleBasedPolicy, ANONYMOUS};
pub use api_pool::{ApiPool, BackpressureError, PoolStats};
pub use catalog::CollectionDescription;
pub use config::{NodeInitConfig, StorageMode, ValidatedConfig, CONFIG_FILE_NAME};
pub use identity::{KeyType, NodeIdentity};
pub use node::{Node, NodeComponents, NodeInfo, NodeState};
pub use replication::{
    BoxFuture, ConnectError, Connection, OfflineConnector, PeerAddr, PeerConnector, PeerState,
    PeerStatus, RetrySchedule,
};
pub use resolver::{CollectionHandle, CollectionRequest};
pub use transactions::{TransactionInfo, TransactionRegistry};
