//! trellis-ctl — command-line interface for the trellisd debug API.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 9093;

fn print_usage() {
    println!("Usage: trellis-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status           Show connection count, graph and logging state");
    println!("  connections      List connected proxies");
    println!("  push             Push fresh clusters to every proxy");
    println!("  debug on|off     Toggle verbose protocol logging");
    println!();
    println!("Options:");
    println!("  --port <port>   Debug API port (default: {})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["connections"] => cmd::connections::cmd_connections(port).await,
        ["push"] => cmd::connections::cmd_push(port).await,
        ["debug", "on"] => cmd::debug::cmd_debug(port, true).await,
        ["debug", "off"] => cmd::debug::cmd_debug(port, false).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            print_usage();
            std::process::exit(1);
        }
    }
}
