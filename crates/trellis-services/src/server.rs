//! Discovery server — owns the registry and the collaborators every stream uses.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trellis_core::{DiscoveryRequest, DiscoveryResponse, CLUSTER_TYPE_URL};

use crate::connection::ConnectionInfo;
use crate::dispatch::{PushDispatcher, PushSummary};
use crate::error::DiscoveryError;
use crate::handler;
use crate::producer::{IdentityParser, ResourceProducer};
use crate::registry::ConnectionRegistry;
use crate::stream::{RequestSource, ResponseSink};

/// Runtime switch for per-message protocol logging.
#[derive(Debug, Clone, Default)]
pub struct VerboseFlag(Arc<AtomicBool>);

impl VerboseFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

pub struct DiscoveryServer {
    registry: ConnectionRegistry,
    dispatcher: PushDispatcher,
    producer: Arc<dyn ResourceProducer>,
    parser: Arc<dyn IdentityParser>,
    verbose: VerboseFlag,
    type_url: String,
}

impl DiscoveryServer {
    /// A server with its own, empty registry.
    pub fn new(producer: Arc<dyn ResourceProducer>, parser: Arc<dyn IdentityParser>) -> Self {
        let registry = ConnectionRegistry::new();
        Self {
            dispatcher: PushDispatcher::new(registry.clone()),
            registry,
            producer,
            parser,
            verbose: VerboseFlag::default(),
            type_url: CLUSTER_TYPE_URL.to_string(),
        }
    }

    pub fn with_verbose(mut self, verbose: VerboseFlag) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_type_url(mut self, type_url: impl Into<String>) -> Self {
        self.type_url = type_url.into();
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &PushDispatcher {
        &self.dispatcher
    }

    pub fn verbose(&self) -> &VerboseFlag {
        &self.verbose
    }

    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    pub(crate) fn producer(&self) -> &dyn ResourceProducer {
        self.producer.as_ref()
    }

    pub(crate) fn parser(&self) -> &dyn IdentityParser {
        self.parser.as_ref()
    }

    /// Invalidate every connected proxy.
    pub fn push_all(&self) -> PushSummary {
        self.dispatcher.broadcast_push()
    }

    /// Metadata of every live connection, keyed and ordered by registry key.
    pub fn connections(&self) -> BTreeMap<String, ConnectionInfo> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(key, conn)| (key, conn.info()))
            .collect()
    }

    /// Serve one cluster discovery stream until it ends.
    ///
    /// Returns `Ok(())` on end-of-stream or cancellation.
    pub async fn stream_clusters<R, W>(
        &self,
        peer: Option<SocketAddr>,
        requests: R,
        responses: W,
    ) -> Result<(), DiscoveryError>
    where
        R: RequestSource,
        W: ResponseSink,
    {
        handler::run(self, peer, requests, responses).await
    }

    /// Non-streaming fetch. Not supported.
    pub async fn fetch_clusters(
        &self,
        _request: DiscoveryRequest,
    ) -> Result<DiscoveryResponse, DiscoveryError> {
        Err(DiscoveryError::NotImplemented)
    }
}
