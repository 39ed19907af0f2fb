//! Flat initialization options
//!
//! Hosts that marshal a single record across the boundary fill in a
//! [`NodeInitOptions`]. List-valued settings are comma-separated strings and
//! empty strings mean "not set". [`NodeInitOptions::into_config`] turns the
//! record into the structured [`NodeInitConfig`] the node validates.

use serde::{Deserialize, Serialize};
use tessera_core::error::{TesseraError, TesseraResult};
use tessera_engine::config::NodeInitConfig;

/// Single-record initialization options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInitOptions {
    /// Persistent data directory; empty for none
    pub db_path: String,
    /// Run with in-memory storage
    pub in_memory: bool,
    /// Comma-separated listen addresses
    pub listening_addresses: String,
    /// Comma-separated reconnect intervals in seconds
    pub retry_intervals: String,
    /// Comma-separated peer addresses
    pub peers: String,
    /// Key type name ("secp256k1", "ed25519"); empty for the default
    pub key_type: String,
    /// Hex-encoded private key; empty for no identity
    pub private_key: String,
    /// Do not start P2P
    pub disable_p2p: bool,
    /// Do not start the api pool
    pub disable_api: bool,
    /// Conflict retry bound; `None` keeps the default
    pub max_transaction_retries: Option<i64>,
}

impl NodeInitOptions {
    /// In-memory options with every subsystem at its default
    pub fn in_memory() -> Self {
        NodeInitOptions {
            in_memory: true,
            ..Default::default()
        }
    }

    /// Persistent options rooted at `path`
    pub fn persistent(path: impl Into<String>) -> Self {
        NodeInitOptions {
            db_path: path.into(),
            ..Default::default()
        }
    }

    /// Convert to a structured config
    ///
    /// Only the flat encoding is checked here (numbers parse, counts are
    /// non-negative). Everything else is validated by `Node::initialize`.
    /// Networking strings are not parsed at all when P2P is disabled.
    pub fn into_config(self) -> TesseraResult<NodeInitConfig> {
        let mut config = NodeInitConfig::default();

        config.storage.in_memory = self.in_memory;
        config.storage.path = non_empty(&self.db_path).map(Into::into);

        config.network.p2p_enabled = !self.disable_p2p;
        if config.network.p2p_enabled {
            config.network.listen_addresses = split_list(&self.listening_addresses);
            config.network.peers = split_list(&self.peers);
            config.network.retry_intervals_secs = split_list(&self.retry_intervals)
                .iter()
                .map(|s| parse_interval(s))
                .collect::<TesseraResult<Vec<_>>>()?;
        }

        config.identity.key_type = non_empty(&self.key_type).map(str::to_string);
        config.identity.private_key = non_empty(&self.private_key).map(str::to_string);

        if let Some(retries) = self.max_transaction_retries {
            config.transactions.max_retries = u32::try_from(retries).map_err(|_| {
                TesseraError::validation(format!(
                    "max transaction retries must be between 0 and {}, got {}",
                    u32::MAX,
                    retries
                ))
            })?;
        }

        config.api.enabled = !self.disable_api;
        Ok(config)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_interval(s: &str) -> TesseraResult<u64> {
    s.parse::<u64>().map_err(|_| {
        TesseraError::validation(format!(
            "invalid retry interval '{}': expected whole seconds",
            s
        ))
    })
}
