//! Shared helpers for the integration tests.

use blox_client::GameClient;
use blox_server::server::{bind_ephemeral_with, GameServer};
use blox_shared::config::EngineConfig;
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server running its loop on a background task. Aborted on drop.
pub struct RunningServer {
    pub cfg: EngineConfig,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    pub async fn start(tick_hz: u32) -> anyhow::Result<Self> {
        Self::start_with(EngineConfig {
            tick_hz,
            ..EngineConfig::default()
        })
        .await
    }

    pub async fn start_with(cfg: EngineConfig) -> anyhow::Result<Self> {
        let (mut server, cfg): (GameServer, EngineConfig) = bind_ephemeral_with(cfg).await?;
        let task = tokio::spawn(async move { server.run().await });
        Ok(Self { cfg, task })
    }

    pub async fn connect(&self) -> anyhow::Result<GameClient> {
        GameClient::connect(&self.cfg).await
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
