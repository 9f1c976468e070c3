use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    connections: usize,
    verbose: bool,
    type_url: String,
    graph_version: Option<String>,
    graph_clusters: usize,
    uptime_secs: u64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Trellis Discovery Status");
    println!("═══════════════════════════════════════");
    println!("  Connections    : {}", resp.connections);
    println!("  Verbose log    : {}", if resp.verbose { "on" } else { "off" });
    println!("  Type URL       : {}", resp.type_url);
    match resp.graph_version {
        Some(v) if !v.is_empty() => {
            println!("  Graph version  : {}", v);
            println!("  Graph clusters : {}", resp.graph_clusters);
        }
        Some(_) => println!("  Graph clusters : {}", resp.graph_clusters),
        None => println!("  Graph          : none"),
    }
    println!("  Uptime         : {}s", resp.uptime_secs);

    Ok(())
}
