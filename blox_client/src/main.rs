//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p blox_client -- [--addr 127.0.0.1:8001]
//!
//! Console lines:
//!   w a s d jump use  - one input message with those keys held
//!   turn <radians>    - set camera yaw for later input
//!   say <message>     - send chat message
//!   status            - show mirror state
//!   quit              - exit

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use blox_client::client::{ClientState, GameClient};
use blox_client::input::parse_line;
use blox_shared::{config::EngineConfig, ecs::ChatList};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    info!(player = ?client.player(), "Connected to server");

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("> ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut yaw = 0.0f32;
    let mut last_seen = None;
    while client.state != ClientState::Disconnected {
        while let Ok(line) = console_rx.try_recv() {
            match line.trim() {
                "quit" | "exit" => return Ok(()),
                "status" => {
                    println!(
                        "player {:?}, {} entities, last tick {:?}",
                        client.player(),
                        client.mirror.world.len(),
                        client.mirror.last_tick()
                    );
                }
                other => {
                    if let Some(msg) = parse_line(other, &mut yaw) {
                        client.send(&msg).await?;
                    }
                }
            }
        }

        client.poll(Duration::from_millis(50)).await?;

        for (_, list) in client.mirror.world.iter::<ChatList>() {
            for entry in &list.messages {
                if last_seen.map_or(true, |t| entry.timestamp > t) {
                    println!("[{}] {:?}: {}", entry.timestamp.format("%H:%M:%S"), entry.author, entry.content);
                    last_seen = Some(entry.timestamp);
                }
            }
        }
    }
    println!("Disconnected from server.");
    Ok(())
}
