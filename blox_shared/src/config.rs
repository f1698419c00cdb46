//! Configuration system.
//!
//! Loads engine configuration from JSON strings or files. Every field has a
//! default so a partial file only overrides what it names.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Root configuration shared by client and server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:8001`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// TLS certificate, production deployments only.
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    /// Largest inbound client frame in bytes.
    pub max_payload_len: usize,
    /// Connections silent for longer than this are closed.
    pub idle_timeout_secs: u64,
    /// Outbound bytes buffered per connection before backpressure is reported.
    pub backpressure_watermark: usize,
    /// Directory mesh assets are resolved against.
    pub assets_dir: String,
    pub world: WorldConfig,
}

/// Tunables of the sample world and its systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Half extent of the square players spawn in, centered on the origin.
    pub spawn_range_xz: f32,
    pub spawn_height: f32,
    /// Bodies below this height are returned to their spawn position.
    pub fall_limit_y: f32,
    pub randomize_interval_ticks: u64,
    /// How close a player must be to a vehicle to board it.
    pub interaction_radius: f32,
    pub move_impulse: f32,
    pub jump_impulse: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            spawn_range_xz: 10.0,
            spawn_height: 5.0,
            fall_limit_y: -50.0,
            randomize_interval_ticks: 20,
            interaction_radius: 4.0,
            move_impulse: 0.5,
            jump_impulse: 5.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8001".to_string(),
            tick_hz: 20,
            tls_cert_path: None,
            tls_key_path: None,
            max_payload_len: 512,
            idle_timeout_secs: 32,
            backpressure_watermark: 1024,
            assets_dir: "assets".to_string(),
            world: WorldConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Tick interval; a zero rate is treated as one tick per second.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }
}
