//! Uniform result envelope for boundary calls
//!
//! ## The Contract
//!
//! ```text
//! status == Success  =>  value is well-formed JSON, error is empty
//! status == Failure  =>  error is a non-empty message, value is empty
//! ```
//!
//! Fields are private: the only way to build a `CallResult` is through
//! [`CallResult::success`], [`CallResult::failure`] or
//! [`CallResult::from_result`], which uphold the contract. A value that
//! cannot be serialized becomes a failure, never a partial value.

use crate::error::{TesseraError, TesseraResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome discriminant
///
/// Serialized as the integer `0` (success) or `1` (failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    /// The call succeeded; `value` holds the payload
    Success,
    /// The call failed; `error` holds the diagnostic
    Failure,
}

impl CallStatus {
    /// Integer code of this status
    pub fn code(&self) -> u8 {
        match self {
            CallStatus::Success => 0,
            CallStatus::Failure => 1,
        }
    }
}

impl Serialize for CallStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for CallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(CallStatus::Success),
            1 => Ok(CallStatus::Failure),
            other => Err(serde::de::Error::custom(format!(
                "invalid call status {}",
                other
            ))),
        }
    }
}

/// Result of one boundary call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallResult {
    status: CallStatus,
    error: String,
    value: String,
}

impl CallResult {
    /// Successful outcome carrying `value` serialized as JSON
    ///
    /// Falls back to a failure envelope when serialization fails.
    pub fn success<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => CallResult {
                status: CallStatus::Success,
                error: String::new(),
                value: json,
            },
            Err(e) => CallResult::failure(&TesseraError::from(e)),
        }
    }

    /// Failed outcome carrying the error's message
    pub fn failure(err: &TesseraError) -> Self {
        CallResult::failure_message(err.to_string())
    }

    /// Failed outcome with a free-form diagnostic
    ///
    /// An empty message is replaced so that failures always carry a diagnostic.
    pub fn failure_message(message: impl Into<String>) -> Self {
        let mut error = message.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        CallResult {
            status: CallStatus::Failure,
            error,
            value: String::new(),
        }
    }

    /// Fold a node result into an envelope
    pub fn from_result<T: Serialize>(result: TesseraResult<T>) -> Self {
        match result {
            Ok(value) => CallResult::success(&value),
            Err(e) => CallResult::failure(&e),
        }
    }

    /// Outcome discriminant
    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }

    /// Error message (empty on success)
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Serialized JSON payload (empty on failure)
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Decode the payload back into a typed value
    ///
    /// A failure envelope is returned as `Err` carrying its message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, String> {
        match self.status {
            CallStatus::Success => serde_json::from_str(&self.value).map_err(|e| e.to_string()),
            CallStatus::Failure => Err(self.error.clone()),
        }
    }
}

#[derive(Deserialize)]
struct RawCallResult {
    status: CallStatus,
    #[serde(default)]
    error: String,
    #[serde(default)]
    value: String,
}

impl<'de> Deserialize<'de> for CallResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawCallResult::deserialize(deserializer)?;
        match raw.status {
            CallStatus::Success if !raw.error.is_empty() => Err(serde::de::Error::custom(
                "successful result must not carry an error",
            )),
            CallStatus::Success => {
                serde_json::from_str::<serde_json::Value>(&raw.value)
                    .map_err(serde::de::Error::custom)?;
                Ok(CallResult {
                    status: CallStatus::Success,
                    error: String::new(),
                    value: raw.value,
                })
            }
            CallStatus::Failure if raw.error.is_empty() || !raw.value.is_empty() => Err(
                serde::de::Error::custom("failed result must carry only an error"),
            ),
            CallStatus::Failure => Ok(CallResult::failure_message(raw.error)),
        }
    }
}
