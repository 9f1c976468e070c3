use trellis_core::identity::IdentityError;
use trellis_core::wire::WireError;

/// Failure of the underlying stream transport.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream cancelled")]
    Cancelled,
    #[error("stream closed by peer")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl StreamError {
    /// Cancellation ends a stream cleanly, like end-of-stream does.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Why a discovery stream (or fetch) failed.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("first request carries no node")]
    MissingNode,
    #[error("invalid node identity: {0}")]
    Identity(#[from] IdentityError),
    #[error("receive failed: {0}")]
    Receive(#[source] StreamError),
    #[error("send failed: {0}")]
    Send(#[source] StreamError),
    #[error("stream reader failed: {0}")]
    Reader(String),
    #[error("not implemented")]
    NotImplemented,
}

impl DiscoveryError {
    /// Errors caused by what the client sent rather than by the transport or server.
    pub fn is_client_caused(&self) -> bool {
        matches!(self, DiscoveryError::MissingNode | DiscoveryError::Identity(_))
    }
}
