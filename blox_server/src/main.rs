//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p blox_server -- [--config server.json] [--addr 127.0.0.1:8001] [--tick-hz 20]
//!
//! Flags override values read from the config file. The server builds the
//! sample world, accepts framed TCP connections and broadcasts deltas every
//! tick.

use std::env;

use anyhow::Context;
use blox_server::GameServer;
use blox_shared::config::EngineConfig;
use tracing::info;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    addr: Option<String>,
    tick_hz: Option<u32>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut out = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(args[i + 1].clone());
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                let hz = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --tick-hz {}", args[i + 1]))?;
                out.tick_hz = Some(hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let mut cfg = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(addr) = args.addr {
        cfg.server_addr = addr;
    }
    if let Some(hz) = args.tick_hz {
        cfg.tick_hz = hz;
    }
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, assets = %cfg.assets_dir, "Starting server");

    let mut server = GameServer::new(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    server.run().await
}
