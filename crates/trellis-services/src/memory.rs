//! In-process stream transport, for tests and embedding.
//!
//! [`memory_stream`] returns the server halves plus a [`MemoryClient`] that
//! plays the proxy.

use tokio::sync::mpsc;
use trellis_core::{DiscoveryRequest, DiscoveryResponse};

use crate::error::StreamError;
use crate::stream::{RequestSource, ResponseSink};

type Inbound = Result<DiscoveryRequest, StreamError>;

pub fn memory_stream() -> (MemoryClient, MemorySource, MemorySink) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();
    (
        MemoryClient {
            requests: Some(req_tx),
            responses: resp_rx,
        },
        MemorySource { rx: req_rx },
        MemorySink { tx: resp_tx },
    )
}

/// Proxy side of an in-memory stream.
pub struct MemoryClient {
    requests: Option<mpsc::UnboundedSender<Inbound>>,
    responses: mpsc::UnboundedReceiver<DiscoveryResponse>,
}

impl MemoryClient {
    /// Send a request. Returns false once the stream is closed.
    pub fn send(&self, request: DiscoveryRequest) -> bool {
        self.push(Ok(request))
    }

    /// Make the server's next receive fail with `error`.
    pub fn fail(&self, error: StreamError) -> bool {
        self.push(Err(error))
    }

    /// End the request half (end-of-stream).
    pub fn close(&mut self) {
        self.requests = None;
    }

    /// Next response, or `None` once the server dropped its sink.
    pub async fn recv(&mut self) -> Option<DiscoveryResponse> {
        self.responses.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DiscoveryResponse> {
        self.responses.try_recv().ok()
    }

    fn push(&self, item: Inbound) -> bool {
        match &self.requests {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl RequestSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>, StreamError> {
        match self.rx.recv().await {
            Some(Ok(request)) => Ok(Some(request)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

pub struct MemorySink {
    tx: mpsc::UnboundedSender<DiscoveryResponse>,
}

impl ResponseSink for MemorySink {
    async fn send(&mut self, response: DiscoveryResponse) -> Result<(), StreamError> {
        self.tx.send(response).map_err(|_| StreamError::Closed)
    }
}
