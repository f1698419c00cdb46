//! `blox_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation loop and system scheduler
//! - Entity registry owned by a single task
//! - Dispatches inbound client messages to typed handlers
//! - Replicates snapshots on connect and dirty deltas every tick
//!
//! Networking model:
//! - TCP with length-prefixed frames; one reader and one writer task per
//!   connection, reporting to the server loop over a channel.

pub mod assets;
pub mod dispatch;
pub mod replication;
pub mod server;
pub mod session;
pub mod simulation;
pub mod systems;
pub mod transport;
pub mod world_setup;

pub use server::GameServer;
