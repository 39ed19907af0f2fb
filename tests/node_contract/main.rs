//! Node Contract Integration Tests
//!
//! End-to-end behavior of a node through its public surface:
//! - Bootstrap ordering, failure cleanup and shutdown
//! - Transaction lifecycle, snapshot isolation and conflict retry
//! - Collection resolution rules
//! - Peer reconnect scheduling
//! - The boundary scenario through `NodeHandle`

#[path = "../common/mod.rs"]
mod common;

mod bootstrap;
mod replication;
mod resolution;
mod scenario;
mod transactions;
