//! Non-streaming cluster fetch. Always answers 501.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use trellis_core::DiscoveryRequest;
use trellis_services::DiscoveryError;

use super::ApiState;

pub async fn handle_fetch_clusters(
    State(state): State<ApiState>,
    Json(request): Json<DiscoveryRequest>,
) -> Result<Json<trellis_core::DiscoveryResponse>, (StatusCode, String)> {
    state
        .server
        .fetch_clusters(request)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match e {
                DiscoveryError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
                DiscoveryError::MissingNode | DiscoveryError::Identity(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })
}
