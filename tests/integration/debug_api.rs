//! HTTP debug surface against a live server.

use anyhow::Result;

use crate::*;

#[tokio::test]
async fn test_status_shape() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    proxy.hello(NODE_A).await?;

    let status = h.api_get("/status").await?;
    assert_eq!(status["connections"], 1);
    assert_eq!(status["verbose"], false);
    assert_eq!(status["graph_version"], "it-1");
    assert_eq!(status["graph_clusters"], 2);
    assert!(status["uptime_secs"].is_number());
    Ok(())
}

#[tokio::test]
async fn test_cdsz_snapshot_lists_identified_proxies() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    proxy.hello(NODE_A).await?;

    let body = h.api_get("/debug/cdsz").await?;
    let connections = body["connections"].as_object().unwrap();
    assert_eq!(connections.len(), 1);
    let (key, info) = connections.iter().next().unwrap();
    assert!(key.starts_with(NODE_A));
    assert_eq!(info["node_id"], NODE_A);
    assert_eq!(info["identity"]["id"], "reviews-v1.bookinfo");
    assert!(info["peer_addr"].as_str().unwrap().starts_with("127.0.0.1:"));
    Ok(())
}

#[tokio::test]
async fn test_cdsz_push_reaches_proxy() -> Result<()> {
    let h = Harness::start().await?;
    let mut proxy = h.connect().await?;
    let first = proxy.hello(NODE_A).await?;

    let body = h.api_get("/debug/cdsz?push=1").await?;
    assert_eq!(body["push"]["connections"], 1);

    let pushed = proxy.recv().await?;
    assert_ne!(pushed.nonce, first.nonce);
    Ok(())
}

#[tokio::test]
async fn test_cdsz_debug_toggle() -> Result<()> {
    let h = Harness::start().await?;

    let body = h.api_get("/debug/cdsz?debug=1").await?;
    assert_eq!(body["verbose"], true);
    assert!(h.server.verbose().is_enabled());

    let body = h.api_get("/debug/cdsz?debug=0").await?;
    assert_eq!(body["verbose"], false);
    assert!(!h.server.verbose().is_enabled());
    Ok(())
}

#[tokio::test]
async fn test_fetch_clusters_not_implemented() -> Result<()> {
    let h = Harness::start().await?;
    let resp = reqwest::Client::new()
        .post(h.api_url("/v2/discovery:clusters"))
        .json(&DiscoveryRequest::initial(NODE_A, CLUSTER_TYPE_URL))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 501);
    assert_eq!(resp.text().await?, "not implemented");
    Ok(())
}
