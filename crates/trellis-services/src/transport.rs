//! TCP transport: one discovery stream per connection, framed as
//! newline-delimited JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use trellis_core::wire::{decode_frame, encode_frame, WireError, MAX_FRAME_LEN};
use trellis_core::{DiscoveryRequest, DiscoveryResponse};

use crate::error::StreamError;
use crate::server::DiscoveryServer;
use crate::stream::{RequestSource, ResponseSink};

/// Reads frames off a byte stream. Blank lines are skipped.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next frame, or `None` at end of stream.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, StreamError> {
        loop {
            self.buf.clear();
            let n = (&mut self.inner)
                .take(MAX_FRAME_LEN as u64 + 1)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            let body = n - usize::from(self.buf.ends_with(b"\n"));
            if body > MAX_FRAME_LEN {
                return Err(WireError::FrameTooLarge(body).into());
            }
            if self.buf.trim_ascii().is_empty() {
                continue;
            }
            return Ok(Some(decode_frame(&self.buf)?));
        }
    }
}

impl<R> RequestSource for FrameReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>, StreamError> {
        self.read_frame().await
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame<T: Serialize>(&mut self, msg: &T) -> Result<(), StreamError> {
        let frame = encode_frame(msg)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

impl<W> ResponseSink for FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, response: DiscoveryResponse) -> Result<(), StreamError> {
        self.write_frame(&response).await
    }
}

/// Accepts proxy connections and runs a discovery stream on each.
pub struct DiscoveryListener {
    listener: TcpListener,
    server: Arc<DiscoveryServer>,
    shutdown: broadcast::Receiver<()>,
}

impl DiscoveryListener {
    pub fn new(
        listener: TcpListener,
        server: Arc<DiscoveryServer>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            server,
            shutdown,
        }
    }

    /// Accept until shutdown, then cancel every open stream.
    pub async fn run(mut self) -> Result<()> {
        let mut streams = JoinSet::new();
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(addr = %addr, "discovery listener started");
        }

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(open = streams.len(), "discovery listener shutting down");
                    streams.shutdown().await;
                    return Ok(());
                }

                Some(_) = streams.join_next(), if !streams.is_empty() => {}

                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    streams.spawn(serve_stream(self.server.clone(), socket, peer));
                }
            }
        }
    }
}

async fn serve_stream(server: Arc<DiscoveryServer>, socket: TcpStream, peer: SocketAddr) {
    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }
    let (read, write) = socket.into_split();
    let result = server
        .stream_clusters(Some(peer), FrameReader::new(read), FrameWriter::new(write))
        .await;
    match result {
        Ok(()) => {}
        Err(e) if e.is_client_caused() => {
            tracing::debug!(peer = %peer, error = %e, "stream rejected")
        }
        Err(e) => tracing::warn!(peer = %peer, error = %e, "stream ended with error"),
    }
}
