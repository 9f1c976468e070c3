//! File-backed service graph and the reference resource producer built on it.
//!
//! ```toml
//! version = "2024-06-01.1"
//!
//! [[clusters]]
//! name = "outbound|9080||reviews.bookinfo.svc.cluster.local"
//! endpoints = ["10.4.0.7:9080", "10.4.0.8:9080"]
//! namespaces = ["bookinfo"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use trellis_core::{ParsedIdentity, Resource, CLUSTER_TYPE_URL};

use crate::producer::ResourceProducer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceGraph {
    /// Free-form label of this revision, reported on /status.
    pub version: String,
    pub clusters: Vec<ClusterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Namespaces whose proxies see this cluster. Empty = every proxy.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("duplicate cluster {0:?}")]
    DuplicateCluster(String),
}

impl ServiceGraph {
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::ReadFailed(path.to_path_buf(), e))?;
        let graph: ServiceGraph =
            toml::from_str(&text).map_err(|e| GraphError::ParseFailed(path.to_path_buf(), e))?;
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), GraphError> {
        let mut seen = std::collections::HashSet::new();
        for c in &self.clusters {
            if !seen.insert(c.name.as_str()) {
                return Err(GraphError::DuplicateCluster(c.name.clone()));
            }
        }
        Ok(())
    }

    /// Clusters a proxy with this identity may see, in file order.
    pub fn visible_to<'a, 'b>(
        &'a self,
        identity: &'b ParsedIdentity,
    ) -> impl Iterator<Item = &'a ClusterSpec> + 'b
    where
        'a: 'b,
    {
        self.clusters.iter().filter(move |c| c.visible_to(identity))
    }
}

impl ClusterSpec {
    pub fn visible_to(&self, identity: &ParsedIdentity) -> bool {
        if self.namespaces.is_empty() {
            return true;
        }
        match identity.namespace() {
            Some(ns) => self.namespaces.iter().any(|allowed| allowed == ns),
            None => false,
        }
    }
}

/// Serves cluster resources out of the current [`ServiceGraph`].
///
/// The graph is swapped wholesale on reload; in-flight builds keep the
/// revision they started with.
pub struct GraphProducer {
    graph: RwLock<Arc<ServiceGraph>>,
    type_url: String,
}

impl GraphProducer {
    pub fn new(graph: ServiceGraph) -> Self {
        Self {
            graph: RwLock::new(Arc::new(graph)),
            type_url: CLUSTER_TYPE_URL.to_string(),
        }
    }

    pub fn with_type_url(mut self, type_url: impl Into<String>) -> Self {
        self.type_url = type_url.into();
        self
    }

    pub fn current(&self) -> Arc<ServiceGraph> {
        match self.graph.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, graph: ServiceGraph) {
        let graph = Arc::new(graph);
        match self.graph.write() {
            Ok(mut g) => *g = graph,
            Err(poisoned) => *poisoned.into_inner() = graph,
        }
    }
}

impl ResourceProducer for GraphProducer {
    fn build_resources(&self, identity: &ParsedIdentity) -> Result<Vec<Resource>> {
        let graph = self.current();
        graph
            .visible_to(identity)
            .map(|cluster| {
                let payload = serde_json::to_vec(cluster)
                    .with_context(|| format!("failed to encode cluster {}", cluster.name))?;
                Ok(Resource::new(self.type_url.clone(), payload))
            })
            .collect()
    }
}
