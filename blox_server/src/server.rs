//! Server implementation.
//!
//! An authoritative fixed-tick loop. One task owns the [`Simulation`]; it
//! alternates between running ticks and handling transport events, so inbound
//! messages only ever land between ticks.
//!
//! Connection lifecycle:
//! - open: spawn a player, send `FirstConnection{id}`, send a snapshot.
//! - message: decode and dispatch; anything undecodable is dropped.
//! - close: strip the connection component and mark the player destroyed;
//!   the destroy system finishes the job on the next tick.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Use stable ordering when iterating collections.

use anyhow::Context;
use blox_shared::{
    config::EngineConfig,
    ecs::{ComponentKind, Destroyed},
    math::Vec3,
    protocol::{
        ClientId, ConnectionMessage, Envelope, ReplicationBatch, ServerMessage, ServerMessageType,
    },
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    assets::{box_mesh, FileMeshSource, MeshLoader, MeshSource, StaticMeshSource},
    dispatch::Dispatcher,
    replication::{self, ReplicationSink},
    session::{Session, Sessions},
    simulation::{Scheduler, Simulation},
    transport::{ConnectionHandle, TcpTransport, TransportEvent},
    world_setup,
};

/// Broadcasts deltas to every live session.
struct SessionSink<'a> {
    sessions: &'a mut Sessions,
}

impl ReplicationSink for SessionSink<'_> {
    fn broadcast(&mut self, batch: &ReplicationBatch) {
        let bytes = if batch.is_empty() {
            None
        } else {
            match Envelope::wrap(ServerMessageType::Replication as u8, batch).and_then(|e| e.encode()) {
                Ok(b) => Some(b),
                Err(e) => {
                    error!(tick = batch.tick, error = %e, "Failed to encode delta");
                    None
                }
            }
        };

        let Some(bytes) = bytes else {
            return;
        };
        for session in self.sessions.iter_mut() {
            send_to(session, &bytes);
            session.fresh = false;
        }
    }
}

fn send_to(session: &mut Session, bytes: &[u8]) {
    let under_watermark = session.conn.send(bytes);
    if !under_watermark && !session.congested {
        warn!(
            client_id = ?session.client_id(),
            buffered = session.conn.buffered_bytes(),
            "Connection over backpressure watermark"
        );
    }
    session.congested = !under_watermark;
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    sim: Simulation,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    sessions: Sessions,
    transport: TcpTransport,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl GameServer {
    /// Binds the transport and builds the sample world, loading meshes from
    /// `cfg.assets_dir`.
    pub async fn new(cfg: EngineConfig) -> anyhow::Result<Self> {
        let source = Arc::new(FileMeshSource::new(&cfg.assets_dir));
        let mut server = Self::bind(cfg, source).await?;
        world_setup::populate(&mut server.sim).context("populate world")?;
        Ok(server)
    }

    /// Binds the transport over an empty world.
    pub async fn bind(cfg: EngineConfig, meshes: Arc<dyn MeshSource>) -> anyhow::Result<Self> {
        let (transport, events_rx) = TcpTransport::bind(&cfg).await?;
        let sim = Simulation::new(cfg.world.clone(), MeshLoader::new(meshes));
        Ok(Self {
            cfg,
            sim,
            scheduler: Scheduler::with_default_systems(),
            dispatcher: Dispatcher::default(),
            sessions: Sessions::default(),
            transport,
            events_rx,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn tick(&self) -> u64 {
        self.sim.tick
    }

    pub fn on_connect(&mut self, conn: ConnectionHandle) {
        let client_id = conn.client_id();
        let entity = match world_setup::spawn_player(&mut self.sim, client_id) {
            Ok(e) => e,
            Err(e) => {
                error!(client_id = ?client_id, error = %e, "Cannot spawn player");
                return;
            }
        };
        let mut session = Session::new(conn, entity);

        let hello = ServerMessage::FirstConnection(ConnectionMessage { id: entity }).encode();
        let snapshot = replication::build_snapshot(&self.sim.world, self.sim.tick);
        let snapshot = Envelope::wrap(ServerMessageType::Replication as u8, &snapshot)
            .and_then(|e| e.encode());
        match (hello, snapshot) {
            (Ok(hello), Ok(snapshot)) => {
                send_to(&mut session, &hello);
                send_to(&mut session, &snapshot);
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(client_id = ?client_id, error = %e, "Cannot encode connect messages");
            }
        }

        info!(client_id = ?client_id, entity = ?entity, peer = %session.conn.peer(), "Player joined");
        self.sessions.insert(session);
    }

    pub fn on_message(&mut self, client_id: ClientId, bytes: &[u8]) {
        let Some(entity) = self.sessions.entity_of(client_id) else {
            debug!(client_id = ?client_id, "Message from unknown connection");
            return;
        };
        if let Err(e) = self.dispatcher.dispatch(&mut self.sim, entity, bytes) {
            debug!(client_id = ?client_id, error = %e, "Dropping message");
        }
    }

    pub fn on_close(&mut self, client_id: ClientId, code: u16, reason: &str) {
        let Some(session) = self.sessions.remove(client_id) else {
            warn!(client_id = ?client_id, code, "Close for unknown connection");
            return;
        };
        let entity = session.entity;
        if !self.sim.world.contains(entity) {
            warn!(client_id = ?client_id, entity = ?entity, "Disconnected player already gone");
            return;
        }

        let sim = &mut self.sim;
        if let Err(e) = sim
            .world
            .remove_component(&mut sim.events, entity, ComponentKind::Connection)
        {
            warn!(entity = ?entity, error = %e, "Cannot detach connection");
        }
        if let Err(e) = sim.world.add_component(&mut sim.events, entity, Destroyed) {
            warn!(entity = ?entity, error = %e, "Cannot mark player destroyed");
        }
        info!(client_id = ?client_id, entity = ?entity, code, %reason, "Player left");
    }

    pub fn on_drain(&mut self, client_id: ClientId) {
        if let Some(session) = self.sessions.get_mut(client_id) {
            session.congested = false;
            debug!(client_id = ?client_id, "Connection drained");
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open(conn) => self.on_connect(conn),
            TransportEvent::Message { client_id, bytes } => self.on_message(client_id, &bytes),
            TransportEvent::Close {
                client_id,
                code,
                reason,
            } => self.on_close(client_id, code, &reason),
            TransportEvent::Drain { client_id } => self.on_drain(client_id),
        }
    }

    /// Handles every transport event already queued without waiting.
    pub fn pump_transport(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_transport_event(event);
            handled += 1;
        }
        handled
    }

    /// Executes one fixed simulation step and broadcasts its delta.
    pub fn step(&mut self, dt_sec: f32) -> ReplicationBatch {
        let mut sink = SessionSink {
            sessions: &mut self.sessions,
        };
        self.scheduler.step(&mut self.sim, dt_sec, &mut sink)
    }

    /// Runs until the transport stops.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.run_loop(None).await
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u64) -> anyhow::Result<()> {
        self.run_loop(Some(ticks)).await
    }

    async fn run_loop(&mut self, limit: Option<u64>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.cfg.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        let mut ran = 0u64;

        while limit.map_or(true, |n| ran < n) {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;
                    self.step(dt);
                    ran += 1;
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => anyhow::bail!("transport stopped"),
                },
            }
        }
        Ok(())
    }
}

/// Helper for tests: bind to an ephemeral port with the sample world and an
/// in-memory vehicle mesh.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    bind_ephemeral_with(EngineConfig {
        tick_hz,
        ..Default::default()
    })
    .await
}

/// Like [`bind_ephemeral`], keeping every other setting of `cfg`.
pub async fn bind_ephemeral_with(
    mut cfg: EngineConfig,
) -> anyhow::Result<(GameServer, EngineConfig)> {
    cfg.server_addr = format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let meshes = StaticMeshSource::default()
        .with_mesh(world_setup::VEHICLE_MESH, box_mesh(Vec3::new(1.0, 0.5, 2.0)));
    let mut server = GameServer::bind(cfg.clone(), Arc::new(meshes)).await?;
    world_setup::populate(&mut server.sim).context("populate world")?;

    cfg.server_addr = server.local_addr().to_string();
    server.cfg = cfg.clone();
    Ok((server, cfg))
}
