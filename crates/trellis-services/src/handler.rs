//! Per-stream state machine.
//!
//! ```text
//! AwaitingInitial --first request (valid node)--> Active --stream end/error--> done
//!        |                                          |  ^
//!        +--missing node / bad identity--> done     +--+ ACK, NACK, push signal
//! ```
//!
//! The reader task forwards requests over a capacity-1 queue, so at most one
//! request is buffered ahead of the handler and order is preserved. Responses
//! go out from exactly one place: [`StreamHandler::push`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trellis_core::{version, DiscoveryRequest, DiscoveryResponse};

use crate::connection::Connection;
use crate::error::{DiscoveryError, StreamError};
use crate::registry::ConnectionRegistry;
use crate::server::DiscoveryServer;
use crate::signal::PushReceiver;
use crate::stream::{RequestSource, ResponseSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    AwaitingInitial,
    Active,
}

type ReaderHandle = JoinHandle<Result<(), StreamError>>;

/// Keeps the connection registered for exactly as long as the handler runs.
///
/// Dropping it deregisters under both keys the connection may have had and
/// stops the reader, on every exit path including panics and cancellation.
struct Registration<'s> {
    registry: &'s ConnectionRegistry,
    connection: Arc<Connection>,
    reader: ReaderHandle,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.reader.abort();
        self.registry
            .remove(&self.connection.client_key(), &self.connection);
        self.registry
            .remove(&self.connection.provisional_key(), &self.connection);
    }
}

pub(crate) async fn run<R, W>(
    server: &DiscoveryServer,
    peer: Option<SocketAddr>,
    source: R,
    sink: W,
) -> Result<(), DiscoveryError>
where
    R: RequestSource,
    W: ResponseSink,
{
    let (connection, pushes) = Connection::new(peer);
    let registry = server.registry();
    registry.add(connection.provisional_key(), connection.clone());

    let (req_tx, req_rx) = mpsc::channel(1);
    let mut registration = Registration {
        registry,
        connection: connection.clone(),
        reader: tokio::spawn(read_requests(source, req_tx)),
    };

    tracing::debug!(peer = connection.peer_addr(), "discovery stream opened");

    let mut handler = StreamHandler {
        server,
        connection,
        sink,
        state: StreamState::AwaitingInitial,
    };
    let result = handler
        .drive(req_rx, pushes, &mut registration.reader)
        .await;
    drop(registration);
    result
}

/// Forward requests until end-of-stream, a receive error, or the handler
/// going away. Cancellation counts as a clean end.
async fn read_requests<R: RequestSource>(
    mut source: R,
    requests: mpsc::Sender<DiscoveryRequest>,
) -> Result<(), StreamError> {
    loop {
        match source.recv().await {
            Ok(Some(request)) => {
                if requests.send(request).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) if e.is_cancellation() => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

struct StreamHandler<'s, W> {
    server: &'s DiscoveryServer,
    connection: Arc<Connection>,
    sink: W,
    state: StreamState,
}

impl<W: ResponseSink> StreamHandler<'_, W> {
    async fn drive(
        &mut self,
        mut requests: mpsc::Receiver<DiscoveryRequest>,
        mut pushes: PushReceiver,
        reader: &mut ReaderHandle,
    ) -> Result<(), DiscoveryError> {
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        return self.finish(reader).await;
                    };
                    let initial = self.state == StreamState::AwaitingInitial;
                    if !self.on_request(request)? {
                        continue;
                    }
                    // The initial push carries current state; a signal raised
                    // before it must not fire a second one.
                    if initial && pushes.try_recv() {
                        tracing::debug!(
                            peer = self.connection.peer_addr(),
                            "push raised before initial request, absorbed"
                        );
                    }
                }
                Some(()) = pushes.recv() => {
                    if !self.connection.is_identified() {
                        tracing::debug!(
                            peer = self.connection.peer_addr(),
                            "push before initial request, ignoring"
                        );
                        continue;
                    }
                }
            }
            self.push().await?;
        }
    }

    /// Returns whether the request calls for a push.
    fn on_request(&mut self, request: DiscoveryRequest) -> Result<bool, DiscoveryError> {
        match self.state {
            StreamState::AwaitingInitial => {
                self.identify(&request)?;
                Ok(true)
            }
            StreamState::Active => {
                self.on_ack(&request);
                Ok(false)
            }
        }
    }

    fn identify(&mut self, request: &DiscoveryRequest) -> Result<(), DiscoveryError> {
        let peer = self.connection.peer_addr();
        let Some(node) = request.node.as_ref() else {
            tracing::warn!(peer, "initial request carries no node, closing stream");
            return Err(DiscoveryError::MissingNode);
        };
        let identity = self.server.parser().parse(&node.id).map_err(|e| {
            tracing::warn!(peer, node = %node.id, error = %e, "invalid node identity, closing stream");
            DiscoveryError::from(e)
        })?;

        let provisional = self.connection.provisional_key();
        let key = self.connection.identify(&node.id, identity);
        let registry = self.server.registry();
        registry.add(key.clone(), self.connection.clone());
        registry.remove(&provisional, &self.connection);
        self.state = StreamState::Active;

        if self.server.verbose().is_enabled() {
            tracing::info!(client = %key, peer, request = ?request, "REQ");
        }
        Ok(())
    }

    fn on_ack(&self, request: &DiscoveryRequest) {
        let client = self.connection.client_key();
        let peer = self.connection.peer_addr();
        if let Some(detail) = &request.error_detail {
            tracing::warn!(
                client = %client,
                peer,
                nonce = %request.response_nonce,
                version = %request.version_info,
                code = detail.code,
                message = %detail.message,
                "ACK ERROR"
            );
        } else if self.server.verbose().is_enabled() {
            tracing::info!(
                client = %client,
                peer,
                nonce = %request.response_nonce,
                version = %request.version_info,
                "ACK"
            );
        }
    }

    /// Build and send one full response. A producer failure skips this push
    /// and keeps the stream; a send failure ends it.
    async fn push(&mut self) -> Result<(), DiscoveryError> {
        let Some(identity) = self.connection.identity() else {
            return Ok(());
        };
        let client = self.connection.client_key();
        let peer = self.connection.peer_addr();

        let resources = match self.server.producer().build_resources(identity) {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(client = %client, peer, error = %e, "failed to build clusters, skipping push");
                return Ok(());
            }
        };

        let response = DiscoveryResponse {
            version_info: version::version_info(),
            resources,
            type_url: self.server.type_url().to_string(),
            nonce: version::nonce(),
        };
        let nonce = response.nonce.clone();
        let count = response.resources.len();

        if let Err(e) = self.sink.send(response).await {
            tracing::warn!(client = %client, peer, error = %e, "send failed, closing stream");
            return Err(DiscoveryError::Send(e));
        }

        if self.server.verbose().is_enabled() {
            tracing::info!(client = %client, peer, nonce = %nonce, resources = count, "PUSH");
        }
        Ok(())
    }

    /// The request queue closed: report why the reader stopped.
    async fn finish(&self, reader: &mut ReaderHandle) -> Result<(), DiscoveryError> {
        let client = self.connection.client_key();
        let peer = self.connection.peer_addr();
        match reader.await {
            Ok(Ok(())) => {
                tracing::debug!(client = %client, peer, "discovery stream closed");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(client = %client, peer, error = %e, "discovery stream terminated");
                Err(DiscoveryError::Receive(e))
            }
            Err(e) => {
                tracing::error!(client = %client, peer, error = %e, "stream reader task failed");
                Err(DiscoveryError::Reader(e.to_string()))
            }
        }
    }
}
