//! Peer and listen address parsing
//!
//! Two forms are accepted:
//! - socket addresses: `127.0.0.1:9171`, `[::1]:9171`
//! - multiaddrs: `/ip4/<ip>/tcp/<port>`, `/ip6/<ip>/tcp/<port>`,
//!   `/dns|/dns4|/dns6/<host>/tcp/<port>`, each optionally followed by
//!   `/p2p/<peer-id>`

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tessera_core::error::{TesseraError, TesseraResult};

/// Host part of an address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Host {
    /// Literal IP address
    Ip(IpAddr),
    /// DNS name resolved by the transport
    Dns(String),
}

/// A parsed network address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    host: Host,
    port: u16,
    peer_id: Option<String>,
    raw: String,
}

impl PeerAddr {
    /// Parse either address form
    pub fn parse(raw: &str) -> TesseraResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TesseraError::validation("empty network address"));
        }
        let parsed = if trimmed.starts_with('/') {
            parse_multiaddr(trimmed)
        } else {
            trimmed
                .parse::<SocketAddr>()
                .map(|sa| (Host::Ip(sa.ip()), sa.port(), None))
                .map_err(|e| e.to_string())
        };
        let (host, port, peer_id) = parsed.map_err(|reason| {
            TesseraError::validation(format!("invalid network address '{}': {}", trimmed, reason))
        })?;
        Ok(PeerAddr {
            host,
            port,
            peer_id,
            raw: trimmed.to_string(),
        })
    }

    /// Parse an address that must be dialable (non-zero port)
    pub fn parse_dialable(raw: &str) -> TesseraResult<Self> {
        let addr = PeerAddr::parse(raw)?;
        if addr.port == 0 {
            return Err(TesseraError::validation(format!(
                "invalid peer address '{}': port must be non-zero",
                addr.raw
            )));
        }
        Ok(addr)
    }

    /// Host part
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Peer id from a `/p2p/` suffix
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    /// Address as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_multiaddr(raw: &str) -> Result<(Host, u16, Option<String>), String> {
    let parts: Vec<&str> = raw[1..].split('/').collect();
    let (proto, value, rest) = match parts.as_slice() {
        [proto, value, rest @ ..] => (*proto, *value, rest),
        _ => return Err("expected /<proto>/<host>/tcp/<port>".to_string()),
    };

    let host = match proto {
        "ip4" => value
            .parse::<Ipv4Addr>()
            .map(|ip| Host::Ip(IpAddr::V4(ip)))
            .map_err(|_| format!("invalid ip4 address '{}'", value))?,
        "ip6" => value
            .parse::<Ipv6Addr>()
            .map(|ip| Host::Ip(IpAddr::V6(ip)))
            .map_err(|_| format!("invalid ip6 address '{}'", value))?,
        "dns" | "dns4" | "dns6" => {
            if !is_valid_hostname(value) {
                return Err(format!("invalid host name '{}'", value));
            }
            Host::Dns(value.to_string())
        }
        other => return Err(format!("unsupported protocol '{}'", other)),
    };

    let port = match rest {
        ["tcp", port, ..] => port
            .parse::<u16>()
            .map_err(|_| format!("invalid tcp port '{}'", port))?,
        _ => return Err("missing /tcp/<port>".to_string()),
    };

    let peer_id = match &rest[2..] {
        [] => None,
        ["p2p", id] if is_valid_peer_id(id) => Some(id.to_string()),
        ["p2p", id] => return Err(format!("invalid peer id '{}'", id)),
        _ => return Err("unexpected trailing components".to_string()),
    };

    Ok((host, port, peer_id))
}

fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_valid_peer_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}
