//! Connection listing and push commands, both backed by /debug/cdsz.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct CdszResponse {
    connections: BTreeMap<String, ConnectionInfo>,
    push: Option<PushSummary>,
}

#[derive(Deserialize)]
struct ConnectionInfo {
    peer_addr: String,
    connected_secs: u64,
    node_id: Option<String>,
}

#[derive(Deserialize)]
struct PushSummary {
    connections: usize,
    signalled: usize,
    coalesced: usize,
}

fn print_connections(connections: &BTreeMap<String, ConnectionInfo>) {
    if connections.is_empty() {
        println!("No connected proxies.");
        return;
    }

    println!("═══════════════════════════════════════");
    println!("  Connected Proxies ({})", connections.len());
    println!("═══════════════════════════════════════");

    for (key, c) in connections {
        println!("  ┌─ {}", key);
        println!("  │  peer   : {}", c.peer_addr);
        println!("  │  node   : {}", c.node_id.as_deref().unwrap_or("(awaiting first request)"));
        println!("  └─ uptime : {}s", c.connected_secs);
    }
}

pub async fn cmd_connections(port: u16) -> Result<()> {
    let resp: CdszResponse = get_json(&format!("{}/debug/cdsz", base_url(port))).await?;
    print_connections(&resp.connections);
    Ok(())
}

pub async fn cmd_push(port: u16) -> Result<()> {
    let resp: CdszResponse = get_json(&format!("{}/debug/cdsz?push=1", base_url(port))).await?;
    match resp.push {
        Some(p) => println!(
            "Push sent to {} connections ({} signalled, {} already pending).",
            p.connections, p.signalled, p.coalesced
        ),
        None => println!("Push not acknowledged by daemon."),
    }
    Ok(())
}
