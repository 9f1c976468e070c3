//! Push dispatcher — fans an invalidation out to every registered connection.

use serde::Serialize;

use crate::registry::ConnectionRegistry;
use crate::signal::SignalOutcome;

/// What a broadcast did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    /// Connections in the snapshot.
    pub connections: usize,
    /// Connections that now have a push pending because of this broadcast.
    pub signalled: usize,
    /// Connections that already had a push pending.
    pub coalesced: usize,
    /// Connections whose handler had already exited.
    pub closed: usize,
}

#[derive(Clone)]
pub struct PushDispatcher {
    registry: ConnectionRegistry,
}

impl PushDispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Signal every connection registered right now.
    ///
    /// Iterates a snapshot, so no registry lock is held while signalling, and
    /// never waits on any connection. No ordering across connections.
    pub fn broadcast_push(&self) -> PushSummary {
        let snapshot = self.registry.snapshot();
        let mut summary = PushSummary {
            connections: snapshot.len(),
            ..PushSummary::default()
        };

        for (_, connection) in &snapshot {
            match connection.signal_push() {
                SignalOutcome::Queued => summary.signalled += 1,
                SignalOutcome::Coalesced => summary.coalesced += 1,
                SignalOutcome::Closed => summary.closed += 1,
            }
        }

        tracing::info!(
            connections = summary.connections,
            signalled = summary.signalled,
            coalesced = summary.coalesced,
            "broadcast push"
        );
        summary
    }
}
