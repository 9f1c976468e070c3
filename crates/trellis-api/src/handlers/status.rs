use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connections: usize,
    pub verbose: bool,
    pub type_url: String,
    /// `None` when no service graph is loaded.
    pub graph_version: Option<String>,
    pub graph_clusters: usize,
    pub uptime_secs: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let graph = state.graph.as_ref().map(|g| g.current());

    Json(StatusResponse {
        connections: state.server.registry().len(),
        verbose: state.server.verbose().is_enabled(),
        type_url: state.server.type_url().to_string(),
        graph_version: graph.as_ref().map(|g| g.version.clone()),
        graph_clusters: graph.map(|g| g.clusters.len()).unwrap_or_default(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}
