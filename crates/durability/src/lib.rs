//! Durability layer for tessera
//!
//! Persistent nodes log every committed transaction to a write-ahead log
//! before applying it to the in-memory store:
//! - `encoding`: length-prefixed, CRC-checked record framing
//! - `wal`: append, sync and replay of the log file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod wal;

pub use wal::{Wal, WalError, WalRecord};
