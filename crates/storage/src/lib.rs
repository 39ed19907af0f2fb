//! Storage layer for tessera
//!
//! This crate implements the in-memory MVCC store behind the node:
//! - ShardedStore: DashMap + FxHashMap, one shard per key space
//! - VersionChain: per-key version history with tombstones
//! - ShardedSnapshot: O(1) point-in-time view with a read cache

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;

pub use sharded::{Shard, ShardedSnapshot, ShardedStore, StoredEntry, VersionChain};
