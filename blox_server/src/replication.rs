//! Snapshot and delta encoding.
//!
//! Both passes read straight from entity storage through each entity's
//! network envelope. A snapshot ignores dirty flags; a delta takes only the
//! dirty ones plus the replicated components detached during the tick.

use blox_shared::{
    ecs::{Component, World},
    event::{EventKind, EventQueue},
    protocol::{ComponentRecord, RemovedRecord, ReplicationBatch, ReplicationMode},
};
use tracing::error;

/// Receives the per-tick delta.
pub trait ReplicationSink {
    fn broadcast(&mut self, batch: &ReplicationBatch);
}

fn encode(component: &Component) -> Option<ComponentRecord> {
    match ComponentRecord::from_component(component) {
        Ok(rec) => Some(rec),
        Err(e) => {
            error!(entity = ?component.entity_id(), kind = ?component.kind(), error = %e, "Failed to encode component");
            None
        }
    }
}

/// Every tracked component of every live networked entity.
pub fn build_snapshot(world: &World, tick: u64) -> ReplicationBatch {
    let records = world
        .networked_entities()
        .flat_map(|e| e.tracked_components())
        .filter_map(encode)
        .collect();
    ReplicationBatch {
        tick,
        mode: ReplicationMode::Snapshot,
        records,
        removed: Vec::new(),
    }
}

/// Dirty tracked components plus replicated kinds removed this tick.
///
/// Must run before the event queue is flushed.
pub fn build_delta(world: &World, events: &EventQueue, tick: u64) -> ReplicationBatch {
    let records = world
        .networked_entities()
        .flat_map(|e| e.tracked_components())
        .filter(|c| c.is_dirty())
        .filter_map(encode)
        .collect();

    let removed = events
        .iter()
        .filter(|ev| ev.kind() == EventKind::ComponentRemoved && ev.is_replicated())
        .map(|ev| RemovedRecord {
            entity_id: ev.entity_id(),
            kind: ev.component().kind(),
        })
        .collect();

    ReplicationBatch {
        tick,
        mode: ReplicationMode::Delta,
        records,
        removed,
    }
}
