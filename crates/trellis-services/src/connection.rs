//! Connection — one per proxy discovery stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use trellis_core::ParsedIdentity;

use crate::signal::{push_signal, PushReceiver, PushSignal, SignalOutcome};

pub const UNKNOWN_PEER: &str = "Unknown peer address";

/// Disambiguates connections whose proxies report the same node id.
static CONNECTION_NUMBER: AtomicU64 = AtomicU64::new(0);

/// Registry key for a node id: the id plus a process-wide connection number,
/// since several proxies may connect with the same node id.
pub fn connection_id(node_id: &str, number: u64) -> String {
    format!("{node_id}-{number}")
}

/// State of one live discovery stream.
///
/// The identity is written exactly once, when the first request is processed.
/// Until then the connection is keyed by its peer address.
#[derive(Debug)]
pub struct Connection {
    number: u64,
    peer_addr: String,
    connected_at: SystemTime,
    established: Instant,
    node_id: OnceLock<String>,
    identity: OnceLock<ParsedIdentity>,
    push: PushSignal,
}

impl Connection {
    /// Create a connection and the receiving half of its push signal.
    pub fn new(peer: Option<SocketAddr>) -> (Arc<Self>, PushReceiver) {
        let (push, push_rx) = push_signal();
        let connection = Self {
            number: CONNECTION_NUMBER.fetch_add(1, Ordering::Relaxed) + 1,
            peer_addr: peer
                .map(|p| p.to_string())
                .unwrap_or_else(|| UNKNOWN_PEER.to_string()),
            connected_at: SystemTime::now(),
            established: Instant::now(),
            node_id: OnceLock::new(),
            identity: OnceLock::new(),
            push,
        };
        (Arc::new(connection), push_rx)
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Key used before the proxy has identified itself.
    pub fn provisional_key(&self) -> String {
        connection_id(&self.peer_addr, self.number)
    }

    /// Current registry key.
    pub fn client_key(&self) -> String {
        match self.node_id.get() {
            Some(node_id) => connection_id(node_id, self.number),
            None => self.provisional_key(),
        }
    }

    pub fn identity(&self) -> Option<&ParsedIdentity> {
        self.identity.get()
    }

    pub fn is_identified(&self) -> bool {
        self.identity.get().is_some()
    }

    /// Attach the proxy identity and return the new client key.
    ///
    /// Only the first call has an effect.
    pub fn identify(&self, node_id: &str, identity: ParsedIdentity) -> String {
        if self.identity.set(identity).is_ok() {
            let _ = self.node_id.set(node_id.to_string());
        }
        self.client_key()
    }

    /// Request an asynchronous push. Never blocks.
    pub fn signal_push(&self) -> SignalOutcome {
        self.push.notify()
    }

    /// Serializable metadata. Never exposes the push channel.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            client_key: self.client_key(),
            peer_addr: self.peer_addr.clone(),
            connected_at: self
                .connected_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            connected_secs: self.established.elapsed().as_secs(),
            node_id: self.node_id.get().cloned(),
            identity: self.identity.get().cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub client_key: String,
    pub peer_addr: String,
    /// Unix seconds.
    pub connected_at: u64,
    pub connected_secs: u64,
    pub node_id: Option<String>,
    pub identity: Option<ParsedIdentity>,
}
