//! /debug/cdsz — connection snapshot plus the push and verbose-logging knobs.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use trellis_services::{ConnectionInfo, PushSummary};

use super::ApiState;

#[derive(Debug, Default, Deserialize)]
pub struct CdszQuery {
    /// Any non-empty value broadcasts a push before the snapshot is taken.
    #[serde(default)]
    pub push: Option<String>,
    /// `1` enables verbose logging, any other non-empty value disables it.
    #[serde(default)]
    pub debug: Option<String>,
}

#[derive(Serialize)]
pub struct CdszResponse {
    /// Keyed by registry key.
    pub connections: BTreeMap<String, ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushSummary>,
}

#[derive(Serialize, Deserialize)]
pub struct DebugToggleResponse {
    pub verbose: bool,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub async fn handle_cdsz(State(state): State<ApiState>, Query(q): Query<CdszQuery>) -> Response {
    if let Some(debug) = present(&q.debug) {
        let verbose = debug == "1";
        state.server.verbose().set(verbose);
        tracing::info!(verbose, "verbose discovery logging set via debug endpoint");
        return Json(DebugToggleResponse { verbose }).into_response();
    }

    let push = present(&q.push).map(|_| state.server.push_all());

    let connections = state.server.connections();

    Json(CdszResponse { connections, push }).into_response()
}
