//! Contract types for the node boundary
//!
//! Every operation that crosses the node boundary reports its outcome as a
//! [`CallResult`]: a status discriminant plus exactly one of an error
//! message or a serialized value.
//!
//! ## Usage
//!
//! ```
//! use tessera_core::contract::{CallResult, CallStatus};
//!
//! let ok = CallResult::success(&42u64);
//! assert_eq!(ok.status(), CallStatus::Success);
//! assert_eq!(ok.value(), "42");
//! ```

pub mod envelope;

pub use envelope::{CallResult, CallStatus};
