//! `blox_client`
//!
//! Headless client:
//! - Framed TCP connection to the server
//! - Mirror world fed by snapshots and deltas
//! - Console-driven input and chat

pub mod client;
pub mod input;
pub mod mirror;

pub use client::GameClient;
