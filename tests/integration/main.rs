//! Trellis integration test harness.
//!
//! Each test starts its own discovery server on loopback: a TCP discovery
//! listener plus the HTTP debug API, both on ephemeral ports.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use trellis_core::wire::encode_frame;
use trellis_core::{DiscoveryRequest, DiscoveryResponse, CLUSTER_TYPE_URL};
use trellis_services::{
    DiscoveryListener, DiscoveryServer, FrameReader, GraphProducer, ServiceGraph,
    ServiceNodeParser, VerboseFlag,
};

mod debug_api;
mod stream;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const NODE_A: &str = "sidecar~10.0.0.1~reviews-v1.bookinfo~bookinfo.svc.cluster.local";
pub const NODE_B: &str = "sidecar~10.0.0.2~ratings-v1.bookinfo~bookinfo.svc.cluster.local";
pub const NODE_C: &str = "ingress~10.0.0.3~gateway.istio-system~istio-system.svc.cluster.local";
pub const NODE_D: &str = "router~10.0.0.4~egress.istio-system~istio-system.svc.cluster.local";

const TIMEOUT: Duration = Duration::from_secs(3);

pub const GRAPH: &str = r#"
version = "it-1"

[[clusters]]
name = "outbound|80||shared.default.svc.cluster.local"
endpoints = ["10.1.0.1:80"]

[[clusters]]
name = "outbound|9080||reviews.bookinfo.svc.cluster.local"
endpoints = ["10.4.0.7:9080", "10.4.0.8:9080"]
namespaces = ["bookinfo"]
"#;

pub struct Harness {
    pub server: Arc<DiscoveryServer>,
    pub graph: Arc<GraphProducer>,
    pub discovery_addr: SocketAddr,
    pub api_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

impl Harness {
    pub async fn start() -> Result<Self> {
        let graph: ServiceGraph = toml::from_str(GRAPH)?;
        let producer = Arc::new(GraphProducer::new(graph));
        let server = Arc::new(
            DiscoveryServer::new(producer.clone(), Arc::new(ServiceNodeParser))
                .with_verbose(VerboseFlag::new(false)),
        );
        let (shutdown, _) = broadcast::channel(1);

        let discovery = TcpListener::bind("127.0.0.1:0").await?;
        let discovery_addr = discovery.local_addr()?;
        tokio::spawn(DiscoveryListener::new(discovery, server.clone(), shutdown.subscribe()).run());

        let api = TcpListener::bind("127.0.0.1:0").await?;
        let api_addr = api.local_addr()?;
        let state = trellis_api::ApiState::new(server.clone()).with_graph(producer.clone());
        tokio::spawn(trellis_api::serve_on(api, state));

        Ok(Self {
            server,
            graph: producer,
            discovery_addr,
            api_addr,
            shutdown,
        })
    }

    pub async fn connect(&self) -> Result<Proxy> {
        Proxy::connect(self.discovery_addr).await
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    pub async fn api_get(&self, path: &str) -> Result<serde_json::Value> {
        reqwest::get(self.api_url(path))
            .await
            .with_context(|| format!("GET {path}"))?
            .json()
            .await
            .context("failed to parse response")
    }

    /// Wait until the registry holds exactly `n` connections.
    pub async fn wait_for_connections(&self, n: usize) -> Result<()> {
        tokio::time::timeout(TIMEOUT, async {
            while self.server.registry().len() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .with_context(|| {
            format!(
                "expected {n} connections, registry has {}",
                self.server.registry().len()
            )
        })
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// A fake proxy speaking the framed discovery protocol over TCP.
pub struct Proxy {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Proxy {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        let (read, writer) = socket.into_split();
        Ok(Self {
            reader: FrameReader::new(read),
            writer,
        })
    }

    pub async fn send(&mut self, request: &DiscoveryRequest) -> Result<()> {
        self.writer.write_all(&encode_frame(request)?).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    pub async fn hello(&mut self, node_id: &str) -> Result<DiscoveryResponse> {
        self.send(&DiscoveryRequest::initial(node_id, CLUSTER_TYPE_URL)).await?;
        self.recv().await
    }

    pub async fn recv(&mut self) -> Result<DiscoveryResponse> {
        tokio::time::timeout(TIMEOUT, self.reader.read_frame::<DiscoveryResponse>())
            .await
            .context("timed out waiting for a response")??
            .context("server closed the stream")
    }

    /// `Ok(None)` if nothing arrives within `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Result<Option<DiscoveryResponse>> {
        match tokio::time::timeout(wait, self.reader.read_frame::<DiscoveryResponse>()).await {
            Ok(frame) => Ok(frame?),
            Err(_) => Ok(None),
        }
    }

    /// True once the server has closed its side.
    pub async fn closed_by_server(&mut self) -> Result<bool> {
        let frame: Option<DiscoveryResponse> = tokio::time::timeout(TIMEOUT, self.reader.read_frame::<DiscoveryResponse>())
            .await
            .context("timed out waiting for close")?
            .unwrap_or(None);
        Ok(frame.is_none())
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
