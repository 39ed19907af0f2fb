//! Peer replication plumbing
//!
//! - `address`: listen/peer address parsing
//! - `backoff`: reconnect interval lookup
//! - `scheduler`: per-peer reconnect tasks

pub mod address;
pub mod backoff;
pub mod scheduler;

pub use address::{Host, PeerAddr};
pub use backoff::{next_delay, RetrySchedule};
pub use scheduler::{
    BoxFuture, ConnectError, Connection, OfflineConnector, PeerConnector, PeerState, PeerStatus,
    ReplicationScheduler,
};
