//! Discovery streams over real TCP connections.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use trellis_core::{DiscoveryRequest, DiscoveryResponse, ErrorDetail};
use trellis_services::{ClusterSpec, ServiceGraph};

use crate::*;

const QUIET: Duration = Duration::from_millis(200);

fn cluster_names(resp: &DiscoveryResponse) -> Vec<String> {
    resp.resources
        .iter()
        .map(|r| {
            let v: Value = serde_json::from_slice(&r.value).unwrap();
            v["name"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_initial_push_is_filtered_by_namespace() -> Result<()> {
    let h = Harness::start().await?;

    let mut bookinfo = h.connect().await?;
    let resp = bookinfo.hello(NODE_A).await?;
    assert_eq!(resp.type_url, CLUSTER_TYPE_URL);
    assert_eq!(cluster_names(&resp).len(), 2);

    let mut gateway = h.connect().await?;
    let resp = gateway.hello(NODE_C).await?;
    assert_eq!(
        cluster_names(&resp),
        vec!["outbound|80||shared.default.svc.cluster.local"]
    );
    Ok(())
}

#[tokio::test]
async fn test_ack_is_not_answered() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;

    let resp = proxy.hello(NODE_A).await?;
    proxy.send(&DiscoveryRequest::ack(&resp, None)).await?;
    assert!(proxy.recv_within(QUIET).await?.is_none());
    assert_eq!(h.server.registry().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_nack_keeps_stream_open() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;

    let resp = proxy.hello(NODE_A).await?;
    let nack = DiscoveryRequest::ack(
        &resp,
        Some(ErrorDetail {
            code: 13,
            message: "invalid cluster".into(),
        }),
    );
    proxy.send(&nack).await?;
    assert!(proxy.recv_within(QUIET).await?.is_none());

    h.server.push_all();
    let again = proxy.recv().await?;
    assert_ne!(again.nonce, resp.nonce);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_reaches_each_client_once() -> Result<()> {
    let h = Harness::start().await?;

    let mut proxies = Vec::new();
    for node in [NODE_A, NODE_B, NODE_C] {
        let mut p = h.connect().await?;
        p.hello(node).await?;
        proxies.push(p);
    }

    let summary = h.server.push_all();
    assert_eq!(summary.connections, 3);

    let mut nonces = Vec::new();
    for p in &mut proxies {
        nonces.push(p.recv().await?.nonce);
    }
    nonces.sort();
    nonces.dedup();
    assert_eq!(nonces.len(), 3, "nonces must be unique");

    // A proxy arriving after the broadcast gets its initial push only.
    let mut late = h.connect().await?;
    late.hello(NODE_D).await?;
    assert!(late.recv_within(QUIET).await?.is_none());

    for p in &mut proxies {
        assert!(p.recv_within(QUIET).await?.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_graph_change_is_pushed() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    proxy.hello(NODE_A).await?;

    h.graph.replace(ServiceGraph {
        version: "it-2".into(),
        clusters: vec![ClusterSpec {
            name: "outbound|443||api.bookinfo.svc.cluster.local".into(),
            connect_timeout_ms: 500,
            endpoints: vec!["10.9.0.1:443".into()],
            namespaces: vec!["bookinfo".into()],
        }],
    });
    h.server.push_all();

    let resp = proxy.recv().await?;
    assert_eq!(
        cluster_names(&resp),
        vec!["outbound|443||api.bookinfo.svc.cluster.local"]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_node_closes_stream() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;

    proxy.send_raw(b"{}\n").await?;
    assert!(proxy.closed_by_server().await?);
    h.wait_for_connections(0).await
}

#[tokio::test]
async fn test_invalid_identity_closes_stream() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;

    proxy
        .send(&DiscoveryRequest::initial("gateway~10.0.0.1~x~y", CLUSTER_TYPE_URL))
        .await?;
    assert!(proxy.closed_by_server().await?);
    h.wait_for_connections(0).await
}

#[tokio::test]
async fn test_malformed_frame_closes_stream() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    proxy.hello(NODE_A).await?;

    proxy.send_raw(b"this is not json\n").await?;
    assert!(proxy.closed_by_server().await?);
    h.wait_for_connections(0).await
}

#[tokio::test]
async fn test_disconnect_deregisters() -> Result<()> {
    let h = Harness::start().await?;

    let mut stays = h.connect().await?;
    stays.hello(NODE_A).await?;
    let mut leaves = h.connect().await?;
    leaves.hello(NODE_B).await?;
    h.wait_for_connections(2).await?;

    leaves.close().await?;
    h.wait_for_connections(1).await?;

    let keys: Vec<String> = h
        .server
        .registry()
        .snapshot()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert!(keys[0].starts_with(NODE_A));

    let summary = h.server.push_all();
    assert_eq!(summary.connections, 1);
    stays.recv().await?;
    Ok(())
}

#[tokio::test]
async fn test_unidentified_stream_is_registered_but_not_pushed() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    h.wait_for_connections(1).await?;

    h.server.push_all();
    assert!(proxy.recv_within(QUIET).await?.is_none());

    proxy.hello(NODE_A).await?;
    assert!(proxy.recv_within(QUIET).await?.is_none());
    Ok(())
}
