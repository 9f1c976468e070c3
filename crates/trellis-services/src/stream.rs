//! Transport seam for discovery streams.
//!
//! A stream is split into its inbound and outbound halves so the reader can
//! run on its own task while the handler writes responses.

use std::future::Future;

use trellis_core::{DiscoveryRequest, DiscoveryResponse};

use crate::error::StreamError;

/// Inbound half. `Ok(None)` means the client ended the stream.
pub trait RequestSource: Send + 'static {
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<DiscoveryRequest>, StreamError>> + Send;
}

/// Outbound half.
pub trait ResponseSink: Send {
    fn send(
        &mut self,
        response: DiscoveryResponse,
    ) -> impl Future<Output = Result<(), StreamError>> + Send;
}
