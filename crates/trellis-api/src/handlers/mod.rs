//! HTTP debug handlers — exposes discovery server state as JSON.

pub mod cdsz;
pub mod fetch;
pub mod status;

use std::sync::Arc;
use std::time::Instant;

use trellis_services::{DiscoveryServer, GraphProducer};

#[derive(Clone)]
pub struct ApiState {
    pub server: Arc<DiscoveryServer>,
    /// Present when the server is fed from a service graph file.
    pub graph: Option<Arc<GraphProducer>>,
    pub started: Instant,
}

impl ApiState {
    pub fn new(server: Arc<DiscoveryServer>) -> Self {
        Self {
            server,
            graph: None,
            started: Instant::now(),
        }
    }

    pub fn with_graph(mut self, graph: Arc<GraphProducer>) -> Self {
        self.graph = Some(graph);
        self
    }
}

// Re-export handler functions for use in router setup.
pub use cdsz::handle_cdsz;
pub use fetch::handle_fetch_clusters;
pub use status::handle_status;
