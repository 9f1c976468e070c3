//! Service graph file watcher.
//!
//! Polls the file's modification time; on change the graph is reloaded,
//! swapped into the producer and every connected proxy is pushed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use trellis_services::{GraphProducer, PushDispatcher, ServiceGraph};

pub struct GraphWatcher {
    path: PathBuf,
    interval: Duration,
    producer: Arc<GraphProducer>,
    dispatcher: PushDispatcher,
    shutdown: broadcast::Receiver<()>,
    last_modified: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl GraphWatcher {
    pub fn new(
        path: PathBuf,
        interval: Duration,
        producer: Arc<GraphProducer>,
        dispatcher: PushDispatcher,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let last_modified = modified(&path);
        Self {
            path,
            interval,
            producer,
            dispatcher,
            shutdown,
            last_modified,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        if self.interval.is_zero() {
            tracing::info!("graph polling disabled");
            let _ = self.shutdown.recv().await;
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("graph watcher shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.poll();
                }
            }
        }
    }

    /// Reload if the file changed. Returns whether a new graph was installed.
    fn poll(&mut self) -> bool {
        let current = modified(&self.path);
        if current == self.last_modified {
            return false;
        }
        self.last_modified = current;

        if current.is_none() {
            tracing::warn!(path = %self.path.display(), "service graph file gone, keeping current graph");
            return false;
        }

        match ServiceGraph::load(&self.path) {
            Ok(graph) => {
                tracing::info!(
                    version = %graph.version,
                    clusters = graph.clusters.len(),
                    "service graph reloaded"
                );
                self.producer.replace(graph);
                self.dispatcher.broadcast_push();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to reload service graph, keeping previous");
                false
            }
        }
    }
}
