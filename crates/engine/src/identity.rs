//! Node identity
//!
//! The node is identified by a private key supplied in configuration. Key
//! generation is out of scope: the key material is validated against its
//! key type and reduced to a public fingerprint; the raw key is dropped.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tessera_core::error::{TesseraError, TesseraResult};

/// Order of the secp256k1 group; valid scalars are in [1, n)
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Supported identity key types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// secp256k1 ECDSA key (32-byte scalar)
    #[default]
    Secp256k1,
    /// Ed25519 key (32-byte seed, or 64-byte seed + public key)
    Ed25519,
}

impl KeyType {
    /// Canonical lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "secp256k1",
            KeyType::Ed25519 => "ed25519",
        }
    }

    fn check_material(&self, bytes: &[u8]) -> TesseraResult<()> {
        match self {
            KeyType::Secp256k1 => {
                let scalar: [u8; 32] = bytes.try_into().map_err(|_| {
                    TesseraError::validation(format!(
                        "secp256k1 private key must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                if scalar == [0u8; 32] || scalar >= SECP256K1_ORDER {
                    return Err(TesseraError::validation(
                        "secp256k1 private key is out of range",
                    ));
                }
                Ok(())
            }
            KeyType::Ed25519 => match bytes.len() {
                32 | 64 => Ok(()),
                n => Err(TesseraError::validation(format!(
                    "ed25519 private key must be 32 or 64 bytes, got {}",
                    n
                ))),
            },
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(KeyType::Secp256k1),
            "ed25519" => Ok(KeyType::Ed25519),
            other => Err(TesseraError::validation(format!(
                "unsupported key type '{}' (expected secp256k1 or ed25519)",
                other
            ))),
        }
    }
}

/// Public identity of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Key type of the configured private key
    pub key_type: KeyType,
    /// Hex SHA-256 over the key type name and key bytes
    pub fingerprint: String,
}

impl NodeIdentity {
    /// Validate key material and derive the identity
    ///
    /// `key_type` defaults to secp256k1 when absent. `private_key_hex` may
    /// carry a `0x` prefix.
    pub fn from_key_material(key_type: Option<&str>, private_key_hex: &str) -> TesseraResult<Self> {
        let key_type = match key_type.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.parse()?,
            None => KeyType::default(),
        };
        let trimmed = private_key_hex.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| {
            TesseraError::validation(format!("private key is not valid hex: {}", e))
        })?;
        key_type.check_material(&bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(key_type.as_str().as_bytes());
        hasher.update(&bytes);
        Ok(NodeIdentity {
            key_type,
            fingerprint: hex::encode(hasher.finalize()),
        })
    }

    /// First 16 hex digits of the fingerprint, for logs
    pub fn short_id(&self) -> &str {
        &self.fingerprint[..16.min(self.fingerprint.len())]
    }
}
