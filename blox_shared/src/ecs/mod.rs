//! Entity/component system.
//!
//! Entities are ids with a kind-keyed component map. The component set is a
//! closed enumeration ([`ComponentKind`]) so lookups, event filters and the
//! wire protocol all share one tag. Attach/detach goes through [`World`],
//! which publishes added/removed events into the caller's [`EventQueue`]
//! and keeps each entity's [`NetworkComponent`] envelope in sync.
//!
//! [`EventQueue`]: crate::event::EventQueue

mod component;
mod network;
mod world;

use serde::{Deserialize, Serialize};

pub use component::*;
pub use network::{KindMask, NetworkComponent};
pub use world::{Entity, World};

/// Opaque entity id. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);
