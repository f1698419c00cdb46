//! Client implementation.
//!
//! The client keeps one framed TCP stream to the server. The first message on
//! it names the player entity; everything after that is replication, applied
//! to a [`Mirror`] in arrival order.
//!
//! The server drops connections that stay silent for its idle timeout, so a
//! client with nothing to say sends an idle input every half timeout.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use blox_shared::{
    config::EngineConfig,
    ecs::EntityId,
    protocol::{ChatMessage, ClientMessage, ReliableConn, ServerMessage},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    input::{build_input, InputState},
    mirror::Mirror,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the server to name our player.
    Connecting,
    /// Player id known, receiving replication.
    Playing,
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub state: ClientState,
    pub mirror: Mirror,
    conn: ReliableConn,
    batches_applied: u64,
    keepalive: Duration,
    last_sent: Instant,
    yaw: f32,
}

impl GameClient {
    /// Connects and waits for the server to assign a player entity.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %addr, "Connecting to server");
        let conn = ReliableConn::connect(addr).await?;

        let mut client = Self {
            state: ClientState::Connecting,
            mirror: Mirror::new(),
            conn,
            batches_applied: 0,
            keepalive: Duration::from_secs(cfg.idle_timeout_secs.max(1)) / 2,
            last_sent: Instant::now(),
            yaw: 0.0,
        };
        while client.state == ClientState::Connecting {
            let msg = client.conn.recv().await.context("await FirstConnection")?;
            client.handle(msg);
        }
        Ok(client)
    }

    pub fn player(&self) -> Option<EntityId> {
        self.mirror.local_player()
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Waits up to `timeout` for one server message and applies it. Returns
    /// whether a message arrived. May return early to send a keepalive.
    pub async fn poll(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        if self.last_sent.elapsed() >= self.keepalive {
            debug!("Sending keepalive");
            self.send_input(InputState {
                yaw: self.yaw,
                ..InputState::default()
            })
            .await?;
        }
        let until_keepalive = self.keepalive.saturating_sub(self.last_sent.elapsed());
        match tokio::time::timeout(timeout.min(until_keepalive), self.conn.recv()).await {
            Ok(Ok(msg)) => {
                self.handle(msg);
                Ok(true)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Server connection lost");
                self.state = ClientState::Disconnected;
                Err(e)
            }
            Err(_) => Ok(false),
        }
    }

    /// Polls until `pred` holds for the mirror or `timeout` elapses.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&Mirror) -> bool,
    ) -> anyhow::Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        while !pred(&self.mirror) {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() {
                return Ok(false);
            }
            self.poll(left).await?;
        }
        Ok(true)
    }

    fn handle(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::FirstConnection(hello) => {
                info!(entity = ?hello.id, "Assigned player entity");
                self.mirror.set_local_player(hello.id);
                self.state = ClientState::Playing;
            }
            ServerMessage::Replication(batch) => {
                if let Err(e) = self.mirror.apply(&batch) {
                    debug!(tick = batch.tick, error = %e, "Batch applied with errors");
                }
                self.batches_applied += 1;
            }
        }
    }

    pub async fn send_input(&mut self, input: InputState) -> anyhow::Result<()> {
        self.send(&ClientMessage::Input(build_input(input))).await
    }

    pub async fn say(&mut self, content: impl Into<String>) -> anyhow::Result<()> {
        self.send(&ClientMessage::Chat(ChatMessage {
            content: content.into(),
        }))
        .await
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> anyhow::Result<()> {
        if let ClientMessage::Input(input) = msg {
            self.yaw = input.angle;
        }
        self.conn.send(msg).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Sends bytes that bypass message encoding.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.conn.send_raw(bytes).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    pub fn server_peer(&self) -> anyhow::Result<SocketAddr> {
        self.conn.peer_addr()
    }
}
