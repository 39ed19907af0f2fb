//! Boundary layer for Tessera
//!
//! This crate is the surface hosts embed:
//! - **boundary**: [`NodeHandle`], every operation returning a `CallResult`
//! - **options**: [`NodeInitOptions`], the flat single-record init options
//! - **dispatch**: JSON request/response serving on the api worker pool
//! - **logging**: optional `tracing-subscriber` setup
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera_api::{NodeHandle, NodeInitOptions};
//!
//! let node = NodeHandle::new();
//! let result = node.initialize(NodeInitOptions::in_memory());
//! assert!(result.is_success());
//!
//! let txn: u64 = node.open_transaction(false).decode()?;
//! let found = node.resolve_collection(txn, "v1", "", "Users", "", false);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod dispatch;
pub mod logging;
pub mod options;

pub use boundary::NodeHandle;
pub use dispatch::{Dispatcher, ErrorBody, Request, Response};
pub use logging::init_logging;
pub use options::NodeInitOptions;
