//! `blox_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One closed set of component kinds, shared by the simulation and the wire.
//! - Clear separation of concerns (ecs, events, protocol, physics, config).
//! - Traits at the seams the server swaps out (physics).
//! - No `unsafe`.

pub mod config;
pub mod ecs;
pub mod error;
pub mod event;
pub mod math;
pub mod physics;
pub mod protocol;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::error::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
}
