//! Node configuration via `tessera.toml`
//!
//! A [`NodeInitConfig`] is built once, validated once by
//! [`NodeInitConfig::validate`], and consumed by node bootstrap. It is split
//! into cohesive sections so each bootstrap stage only sees what it needs.
//! Every field has a default, so a partial (or empty) file is valid TOML.

use crate::identity::NodeIdentity;
use crate::replication::{PeerAddr, RetrySchedule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_core::error::{TesseraError, TesseraResult};

/// Config file name placed in the node data directory.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Reconnect intervals used when none are configured (seconds).
pub const DEFAULT_RETRY_INTERVALS_SECS: [u64; 5] = [30, 60, 120, 240, 480];

/// Conflict retries per logical operation when none are configured.
pub const DEFAULT_MAX_TXN_RETRIES: u32 = 5;

fn default_true() -> bool {
    true
}

/// Where the node keeps its data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for persistent storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Keep everything in memory (nothing survives shutdown)
    pub in_memory: bool,
    /// fsync the WAL on every commit
    pub sync_on_commit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: None,
            in_memory: true,
            sync_on_commit: true,
        }
    }
}

/// Validated storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Volatile in-memory store
    InMemory,
    /// Store backed by a WAL in this directory
    Persistent(PathBuf),
}

impl StorageMode {
    /// Short name for logs and node info
    pub fn name(&self) -> &'static str {
        match self {
            StorageMode::InMemory => "in-memory",
            StorageMode::Persistent(_) => "persistent",
        }
    }
}

impl StorageConfig {
    /// Resolve the storage location
    ///
    /// Exactly one of `in_memory` and a non-empty `path` must be selected.
    pub fn mode(&self) -> TesseraResult<StorageMode> {
        let path = self
            .path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());
        match (self.in_memory, path) {
            (true, None) => Ok(StorageMode::InMemory),
            (false, Some(p)) => Ok(StorageMode::Persistent(p.clone())),
            (true, Some(p)) => Err(TesseraError::validation(format!(
                "storage: both in-memory mode and path '{}' selected; choose one",
                p.display()
            ))),
            (false, None) => Err(TesseraError::validation(
                "storage: neither in-memory mode nor a data path selected",
            )),
        }
    }
}

/// Peer-to-peer networking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Start the P2P subsystem
    pub p2p_enabled: bool,
    /// Addresses to listen on
    pub listen_addresses: Vec<String>,
    /// Peers to keep connections to
    pub peers: Vec<String>,
    /// Reconnect intervals in seconds; the last one repeats
    pub retry_intervals_secs: Vec<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            p2p_enabled: default_true(),
            listen_addresses: Vec::new(),
            peers: Vec::new(),
            retry_intervals_secs: Vec::new(),
        }
    }
}

/// Validated networking section
#[derive(Debug, Clone)]
pub struct ValidatedNetwork {
    /// Parsed listen addresses
    pub listen: Vec<PeerAddr>,
    /// Parsed peer addresses (non-zero ports)
    pub peers: Vec<PeerAddr>,
    /// Reconnect schedule
    pub schedule: RetrySchedule,
}

impl NetworkConfig {
    fn validate(&self) -> TesseraResult<Option<ValidatedNetwork>> {
        if !self.p2p_enabled {
            return Ok(None);
        }
        let listen = self
            .listen_addresses
            .iter()
            .map(|a| PeerAddr::parse(a))
            .collect::<TesseraResult<Vec<_>>>()?;
        let peers = self
            .peers
            .iter()
            .map(|a| PeerAddr::parse_dialable(a))
            .collect::<TesseraResult<Vec<_>>>()?;

        if let Some(pos) = self.retry_intervals_secs.iter().position(|s| *s == 0) {
            return Err(TesseraError::validation(format!(
                "retry interval #{} must be positive",
                pos + 1
            )));
        }
        let schedule = if self.retry_intervals_secs.is_empty() {
            RetrySchedule::default()
        } else {
            RetrySchedule::new(
                self.retry_intervals_secs
                    .iter()
                    .map(|s| Duration::from_secs(*s))
                    .collect(),
            )
        };

        Ok(Some(ValidatedNetwork {
            listen,
            peers,
            schedule,
        }))
    }
}

/// Node identity key material.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    /// "secp256k1" (default) or "ed25519"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    /// Hex-encoded private key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl IdentityConfig {
    fn validate(&self) -> TesseraResult<Option<NodeIdentity>> {
        match self.private_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                NodeIdentity::from_key_material(self.key_type.as_deref(), key).map(Some)
            }
            _ => {
                // A key type alone is still checked so typos are reported.
                if let Some(name) = self.key_type.as_deref().filter(|s| !s.trim().is_empty()) {
                    name.parse::<crate::identity::KeyType>()?;
                }
                Ok(None)
            }
        }
    }
}

/// Automatic conflict retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransactionPolicy {
    /// Retries per logical operation after the first attempt (0 = none)
    pub max_retries: u32,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        TransactionPolicy {
            max_retries: DEFAULT_MAX_TXN_RETRIES,
        }
    }
}

/// Request-serving layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Start the API worker pool
    pub enabled: bool,
    /// Worker threads
    pub workers: usize,
    /// Maximum queued requests
    pub queue_depth: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            enabled: default_true(),
            workers: 4,
            queue_depth: 1024,
        }
    }
}

impl ApiConfig {
    fn validate(&self) -> TesseraResult<Option<ApiConfig>> {
        if !self.enabled {
            return Ok(None);
        }
        if self.workers == 0 {
            return Err(TesseraError::validation("api: workers must be positive"));
        }
        if self.queue_depth == 0 {
            return Err(TesseraError::validation("api: queue_depth must be positive"));
        }
        Ok(Some(self.clone()))
    }
}

/// Node configuration loaded from `tessera.toml`.
///
/// # Example
///
/// ```toml
/// [storage]
/// path = "/var/lib/tessera"
/// in_memory = false
///
/// [network]
/// listen_addresses = ["/ip4/0.0.0.0/tcp/9171"]
/// peers = ["/dns4/seed.example.com/tcp/9171"]
/// retry_intervals_secs = [30, 60, 120]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeInitConfig {
    /// Storage location
    pub storage: StorageConfig,
    /// Networking
    pub network: NetworkConfig,
    /// Identity key material
    pub identity: IdentityConfig,
    /// Conflict retry policy
    pub transactions: TransactionPolicy,
    /// Request-serving layer
    pub api: ApiConfig,
}

/// Output of [`NodeInitConfig::validate`]; every field is ready to use.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// Storage location
    pub storage: StorageMode,
    /// fsync the WAL on every commit
    pub sync_on_commit: bool,
    /// Networking, `None` when P2P is disabled
    pub network: Option<ValidatedNetwork>,
    /// Node identity, `None` without key material
    pub identity: Option<NodeIdentity>,
    /// Conflict retries per logical operation
    pub max_retries: u32,
    /// API pool settings, `None` when the API is disabled
    pub api: Option<ApiConfig>,
}

impl NodeInitConfig {
    /// Check every section and resolve it into its runtime form.
    ///
    /// Addresses are ignored entirely when P2P is disabled.
    pub fn validate(&self) -> TesseraResult<ValidatedConfig> {
        Ok(ValidatedConfig {
            storage: self.storage.mode()?,
            sync_on_commit: self.storage.sync_on_commit,
            network: self.network.validate()?,
            identity: self.identity.validate()?,
            max_retries: self.transactions.max_retries,
            api: self.api.validate()?,
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera node configuration

[storage]
# Keep all data in memory (default). Set to false and give a path to persist.
in_memory = true
# path = "/var/lib/tessera"
# fsync the write-ahead log on every commit
sync_on_commit = true

[network]
p2p_enabled = true
# listen_addresses = ["/ip4/0.0.0.0/tcp/9171"]
# peers = ["/ip4/10.0.0.2/tcp/9171"]
# Reconnect intervals in seconds; the last one repeats (default 30,60,120,240,480)
# retry_intervals_secs = [30, 60, 120, 240, 480]

[identity]
# key_type = "secp256k1"   # or "ed25519"
# private_key = "<hex>"

[transactions]
# Conflict retries per operation (0 disables automatic retry)
max_retries = 5

[api]
enabled = true
workers = 4
queue_depth = 1024
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Semantic
    /// checks happen later in [`NodeInitConfig::validate`].
    pub fn from_file(path: &Path) -> TesseraResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            TesseraError::validation(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> TesseraResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                TesseraError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> TesseraResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TesseraError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TesseraError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
