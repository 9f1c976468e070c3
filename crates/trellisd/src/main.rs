//! trellisd — cluster discovery daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use trellis_core::config::TrellisConfig;
use trellis_services::{
    DiscoveryListener, DiscoveryServer, GraphProducer, ServiceGraph, ServiceNodeParser,
    VerboseFlag,
};

mod watch;

use watch::GraphWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = TrellisConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TrellisConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TrellisConfig::default()
    });
    tracing::info!(
        discovery_port = config.network.discovery_port,
        api_port = config.network.api_port,
        verbose = config.discovery.verbose,
        "trellisd starting"
    );

    // Service graph
    let graph_path = config.graph.path.clone();
    let graph = match ServiceGraph::load(&graph_path) {
        Ok(g) => {
            tracing::info!(
                path = %graph_path.display(),
                version = %g.version,
                clusters = g.clusters.len(),
                "service graph loaded"
            );
            g
        }
        Err(e) => {
            tracing::warn!(error = %e, "no usable service graph, serving an empty one");
            ServiceGraph::default()
        }
    };
    let producer =
        Arc::new(GraphProducer::new(graph).with_type_url(config.discovery.type_url.clone()));

    // Discovery server
    let server = Arc::new(
        DiscoveryServer::new(producer.clone(), Arc::new(ServiceNodeParser))
            .with_verbose(VerboseFlag::new(config.discovery.verbose))
            .with_type_url(config.discovery.type_url.clone()),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let listener = TcpListener::bind((config.network.bind.as_str(), config.network.discovery_port))
        .await
        .with_context(|| {
            format!(
                "failed to bind discovery listener on {}:{}",
                config.network.bind, config.network.discovery_port
            )
        })?;

    let discovery_task = tokio::spawn(
        DiscoveryListener::new(listener, server.clone(), shutdown_tx.subscribe()).run(),
    );

    let api_task = {
        let state = trellis_api::ApiState::new(server.clone()).with_graph(producer.clone());
        let bind = config.network.api_bind.clone();
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = trellis_api::serve(state, &bind, port).await {
                tracing::error!(error = %e, "debug API failed");
            }
        })
    };

    let watch_task = tokio::spawn(
        GraphWatcher::new(
            graph_path,
            Duration::from_secs(config.graph.poll_interval_secs),
            producer,
            server.dispatcher().clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let connection_printer = {
        let server = server.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                tracing::debug!(count = server.registry().len(), "connection snapshot");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()     => tracing::info!("shutting down"),
        r = discovery_task         => tracing::error!("discovery listener exited: {:?}", r),
        r = api_task               => tracing::error!("debug API exited: {:?}", r),
        r = watch_task             => tracing::error!("graph watcher exited: {:?}", r),
        r = connection_printer     => tracing::error!("connection printer exited: {:?}", r),
    }

    Ok(())
}
