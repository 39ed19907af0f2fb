//! Per-peer reconnect scheduler
//!
//! Every peer gets its own task on the node's tokio runtime:
//!
//! ```text
//! Disconnected --attempt--> Connecting --ok--> Connected
//!      ^                        |                  |
//!      |   wait next_delay      | err              | link closed
//!      +------------------------+------------------+
//! ```
//!
//! Failures are counted per peer. A link that closes before it was up for
//! [`RetrySchedule::stable_after`] counts as a failure; a longer-lived link
//! resets the count and is redialled at once.
//!
//! Peers can be added and removed while the scheduler runs. Each peer task
//! holds a child of the scheduler's `CancellationToken`: removing a peer
//! cancels its child, shutdown cancels the parent and with it every task,
//! including tasks that are sleeping or in the middle of a connection
//! attempt.

use super::address::PeerAddr;
use super::backoff::RetrySchedule;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tessera_core::error::TesseraError;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Boxed `Send` future used at the connector seam
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A connection attempt or listener failed
#[derive(Debug, Clone, Error)]
#[error("peer {peer} unreachable: {reason}")]
pub struct ConnectError {
    /// Address that failed
    pub peer: String,
    /// Transport-level reason
    pub reason: String,
}

impl ConnectError {
    /// Create a connect error for `peer`
    pub fn new(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        ConnectError {
            peer: peer.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConnectError> for TesseraError {
    fn from(e: ConnectError) -> Self {
        TesseraError::Connection {
            peer: e.peer,
            reason: e.reason,
        }
    }
}

/// An established link to a peer
pub struct Connection {
    closed: BoxFuture<'static, ()>,
}

impl Connection {
    /// Link that is considered closed once `closed` resolves
    pub fn new(closed: impl Future<Output = ()> + Send + 'static) -> Self {
        Connection {
            closed: Box::pin(closed),
        }
    }

    /// Link that never closes on its own
    pub fn persistent() -> Self {
        Connection::new(std::future::pending())
    }

    /// Resolves when the link closes
    pub async fn closed(self) {
        self.closed.await
    }
}

/// Transport seam for peer networking
///
/// The node only needs to listen and to dial; protocol handling lives
/// behind the connector.
pub trait PeerConnector: Send + Sync + 'static {
    /// Start listening on the given addresses
    fn listen(&self, addresses: &[PeerAddr]) -> Result<(), ConnectError>;

    /// Dial a peer
    fn connect(&self, peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>>;
}

/// Connector used when no transport is plugged in
///
/// Listening succeeds; every dial fails, so peers stay in backoff.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineConnector;

impl PeerConnector for OfflineConnector {
    fn listen(&self, _addresses: &[PeerAddr]) -> Result<(), ConnectError> {
        Ok(())
    }

    fn connect(&self, peer: &PeerAddr) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        let peer = peer.to_string();
        Box::pin(async move { Err(ConnectError::new(peer, "no transport configured")) })
    }
}

/// Connection state of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    /// Idle or waiting for the next attempt
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Link established
    Connected,
}

/// Observable status of one peer
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    /// Peer address as configured
    pub address: String,
    /// Current state
    pub state: PeerState,
    /// Failures since the last successful connection
    pub consecutive_failures: u32,
    /// Total connection attempts
    pub attempts: u64,
    /// Last connection error
    pub last_error: Option<String>,
    /// When the last attempt started
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PeerStatus {
    fn new(address: String) -> Self {
        PeerStatus {
            address,
            state: PeerState::Disconnected,
            consecutive_failures: 0,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }
}

type StatusMap = Arc<DashMap<String, PeerStatus>>;

/// Handle to the running peer tasks
pub struct ReplicationScheduler {
    handle: Handle,
    connector: Arc<dyn PeerConnector>,
    schedule: RetrySchedule,
    token: CancellationToken,
    tasks: DashMap<String, CancellationToken>,
    statuses: StatusMap,
}

impl ReplicationScheduler {
    /// Spawn one reconnect task per peer on `handle`
    pub fn spawn(
        handle: &Handle,
        connector: Arc<dyn PeerConnector>,
        peers: Vec<PeerAddr>,
        schedule: RetrySchedule,
    ) -> Self {
        let scheduler = ReplicationScheduler {
            handle: handle.clone(),
            connector,
            schedule,
            token: CancellationToken::new(),
            tasks: DashMap::new(),
            statuses: Arc::new(DashMap::new()),
        };
        for peer in peers {
            scheduler.add_peer(peer);
        }

        info!(
            target: "tessera::p2p",
            peers = scheduler.peer_count(),
            "replication scheduler started"
        );
        scheduler
    }

    /// Start reconnecting to `peer`
    ///
    /// Returns false if the peer is already scheduled or the scheduler was
    /// shut down.
    pub fn add_peer(&self, peer: PeerAddr) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let key = peer.to_string();
        match self.tasks.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let token = self.token.child_token();
                self.statuses.insert(key.clone(), PeerStatus::new(key.clone()));
                slot.insert(token.clone());
                self.handle.spawn(run_peer(
                    Arc::clone(&self.connector),
                    peer,
                    self.schedule.clone(),
                    Arc::clone(&self.statuses),
                    token,
                ));
                debug!(target: "tessera::p2p", peer = %key, "peer added");
                true
            }
        }
    }

    /// Stop reconnecting to `peer` and forget its status
    ///
    /// Returns false if the peer was not scheduled.
    pub fn remove_peer(&self, peer: &PeerAddr) -> bool {
        let key = peer.to_string();
        match self.tasks.remove(&key) {
            Some((_, token)) => {
                token.cancel();
                self.statuses.remove(&key);
                debug!(target: "tessera::p2p", peer = %key, "peer removed");
                true
            }
            None => false,
        }
    }

    /// Snapshot of every peer's status, sorted by address
    pub fn statuses(&self) -> Vec<PeerStatus> {
        let mut all: Vec<PeerStatus> = self.statuses.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }

    /// Number of distinct peers
    pub fn peer_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every pending and in-flight attempt
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            for mut status in self.statuses.iter_mut() {
                status.state = PeerState::Disconnected;
            }
            info!(target: "tessera::p2p", "replication scheduler stopped");
        }
    }

    /// Whether shutdown was requested
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ReplicationScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Apply `f` to the peer's status unless its task was cancelled
///
/// The check runs under the entry lock, so a cancelled task never writes
/// after `shutdown` or `remove_peer` touched the entry.
fn update(
    statuses: &StatusMap,
    key: &str,
    token: &CancellationToken,
    f: impl FnOnce(&mut PeerStatus),
) {
    if let Some(mut status) = statuses.get_mut(key) {
        if !token.is_cancelled() {
            f(status.value_mut());
        }
    }
}

async fn run_peer(
    connector: Arc<dyn PeerConnector>,
    peer: PeerAddr,
    schedule: RetrySchedule,
    statuses: StatusMap,
    token: CancellationToken,
) {
    let key = peer.to_string();
    let mut failures: u32 = 0;

    loop {
        let delay = schedule.delay_after(failures);
        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        update(&statuses, &key, &token, |s| {
            s.state = PeerState::Connecting;
            s.attempts += 1;
            s.last_attempt_at = Some(Utc::now());
        });

        let attempt = tokio::select! {
            _ = token.cancelled() => break,
            result = connector.connect(&peer) => result,
        };

        let reason = match attempt {
            Ok(connection) => {
                let connected_at = Instant::now();
                update(&statuses, &key, &token, |s| s.state = PeerState::Connected);
                info!(target: "tessera::p2p", peer = %key, "peer connected");

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = connection.closed() => {}
                }

                let uptime = connected_at.elapsed();
                if uptime >= schedule.stable_after() {
                    failures = 0;
                    update(&statuses, &key, &token, |s| {
                        s.state = PeerState::Disconnected;
                        s.consecutive_failures = 0;
                    });
                    debug!(target: "tessera::p2p", peer = %key, "link closed, reconnecting");
                    continue;
                }
                format!("link closed after {}ms", uptime.as_millis())
            }
            Err(e) => e.reason,
        };

        failures = failures.saturating_add(1);
        let next = schedule.delay_after(failures);
        update(&statuses, &key, &token, |s| {
            s.state = PeerState::Disconnected;
            s.consecutive_failures = failures;
            s.last_error = Some(reason.clone());
        });
        warn!(
            target: "tessera::p2p",
            peer = %key,
            failures,
            retry_in_secs = next.as_secs(),
            error = %reason,
            "connection attempt failed"
        );
    }

    debug!(target: "tessera::p2p", peer = %key, "peer task cancelled");
}
