pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/debug/cdsz", get(handlers::handle_cdsz))
        .route("/status", get(handlers::handle_status))
        .route("/v2/discovery:clusters", post(handlers::handle_fetch_clusters))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(state: ApiState, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind, port)).await?;
    tracing::info!(bind, port, "debug API listening");
    serve_on(listener, state).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
