use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct DebugToggleResponse {
    verbose: bool,
}

pub async fn cmd_debug(port: u16, enabled: bool) -> Result<()> {
    let flag = if enabled { 1 } else { 0 };
    let resp: DebugToggleResponse =
        get_json(&format!("{}/debug/cdsz?debug={}", base_url(port), flag)).await?;
    println!(
        "Verbose discovery logging {}.",
        if resp.verbose { "enabled" } else { "disabled" }
    );
    Ok(())
}
