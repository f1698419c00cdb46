//! Client-side copy of the replicated world.
//!
//! Batches are applied in arrival order. Within a batch, removals go first so
//! an upsert later in the same batch wins.

use blox_shared::{
    ecs::{ComponentData, ComponentKind, EntityId, Follow, World},
    error::ProtocolError,
    event::EventQueue,
    protocol::{ComponentRecord, RemovedRecord, ReplicationBatch, ReplicationMode},
};
use tracing::{debug, warn};

#[derive(Default)]
pub struct Mirror {
    pub world: World,
    events: EventQueue,
    local_player: Option<EntityId>,
    last_tick: Option<u64>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity this client controls, once the server has said so.
    pub fn local_player(&self) -> Option<EntityId> {
        self.local_player
    }

    pub fn set_local_player(&mut self, id: EntityId) {
        self.local_player = Some(id);
    }

    /// Tick of the last applied batch.
    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Applies one batch. A snapshot replaces the whole mirror. Records that
    /// fail to decode are skipped; the first such error is returned after the
    /// rest of the batch has been applied.
    pub fn apply(&mut self, batch: &ReplicationBatch) -> Result<(), ProtocolError> {
        if batch.mode == ReplicationMode::Snapshot {
            self.world = World::new();
        }
        for removed in &batch.removed {
            self.apply_removed(removed);
        }

        let mut first_err = None;
        for record in &batch.records {
            if let Err(e) = self.apply_record(record) {
                warn!(entity = ?record.entity_id, kind = ?record.kind, error = %e, "Skipping record");
                first_err.get_or_insert(e);
            }
        }
        self.events.flush();
        self.last_tick = Some(batch.tick);
        first_err.map_or(Ok(()), Err)
    }

    fn apply_removed(&mut self, removed: &RemovedRecord) {
        if removed.kind == ComponentKind::VehicleOccupancy && self.is_local(removed.entity_id) {
            self.detach_follow(removed.entity_id);
        }
        match self
            .world
            .remove_component(&mut self.events, removed.entity_id, removed.kind)
        {
            Ok(_) => {}
            Err(e) => debug!(entity = ?removed.entity_id, error = %e, "Removal for unknown entity"),
        }
    }

    fn apply_record(&mut self, record: &ComponentRecord) -> Result<(), ProtocolError> {
        let data = record.decode()?;
        let id = record.entity_id;

        if let ComponentData::Destroyed(_) = data {
            if self.world.despawn(&mut self.events, id).is_ok() {
                debug!(entity = ?id, "Mirror entity destroyed");
            }
            if self.is_local(id) {
                self.local_player = None;
            }
            return Ok(());
        }

        self.world.insert_entity(id);
        let follow = match &data {
            ComponentData::VehicleOccupancy(occ) if self.is_local(id) => Some(occ.vehicle),
            _ => None,
        };
        self.world.add_component(&mut self.events, id, data)?;
        if let Some(target) = follow {
            self.world
                .add_component(&mut self.events, id, Follow { target })?;
        }
        Ok(())
    }

    fn detach_follow(&mut self, id: EntityId) {
        let _ = self
            .world
            .remove_component(&mut self.events, id, ComponentKind::Follow);
    }

    fn is_local(&self, id: EntityId) -> bool {
        self.local_player == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blox_shared::ecs::{Component, Destroyed, Position, Text, VehicleOccupancy};

    fn record(id: u64, data: impl Into<ComponentData>) -> ComponentRecord {
        ComponentRecord::from_component(&Component::new(EntityId(id), data)).unwrap()
    }

    fn batch(mode: ReplicationMode, records: Vec<ComponentRecord>) -> ReplicationBatch {
        ReplicationBatch {
            tick: 1,
            mode,
            records,
            removed: Vec::new(),
        }
    }

    #[test]
    fn snapshot_then_delta_updates_components() {
        let mut mirror = Mirror::new();
        mirror
            .apply(&batch(
                ReplicationMode::Snapshot,
                vec![record(3, Position::new(1.0, 2.0, 3.0)), record(3, Text::new("Player 3"))],
            ))
            .unwrap();
        mirror
            .apply(&batch(ReplicationMode::Delta, vec![record(3, Position::new(4.0, 2.0, 3.0))]))
            .unwrap();
        assert_eq!(mirror.world.get::<Position>(EntityId(3)).unwrap().x, 4.0);
        assert_eq!(mirror.world.get::<Text>(EntityId(3)).unwrap().text, "Player 3");
    }

    #[test]
    fn snapshot_discards_previous_state() {
        let mut mirror = Mirror::new();
        mirror
            .apply(&batch(ReplicationMode::Delta, vec![record(9, Position::default())]))
            .unwrap();
        mirror
            .apply(&batch(ReplicationMode::Snapshot, vec![record(1, Position::default())]))
            .unwrap();
        assert!(!mirror.world.contains(EntityId(9)));
        assert!(mirror.world.contains(EntityId(1)));
    }

    #[test]
    fn destroyed_marker_drops_entity() {
        let mut mirror = Mirror::new();
        mirror
            .apply(&batch(ReplicationMode::Delta, vec![record(5, Position::default())]))
            .unwrap();
        mirror
            .apply(&batch(ReplicationMode::Delta, vec![record(5, Destroyed)]))
            .unwrap();
        assert!(!mirror.world.contains(EntityId(5)));
    }

    #[test]
    fn own_occupancy_toggles_follow() {
        let mut mirror = Mirror::new();
        mirror.set_local_player(EntityId(2));
        let occ = VehicleOccupancy {
            vehicle: EntityId(8),
        };
        mirror
            .apply(&batch(
                ReplicationMode::Delta,
                vec![record(2, occ), record(4, occ)],
            ))
            .unwrap();
        assert_eq!(
            mirror.world.get::<Follow>(EntityId(2)),
            Some(&Follow {
                target: EntityId(8)
            })
        );
        assert!(mirror.world.get::<Follow>(EntityId(4)).is_none());

        let mut leave = batch(ReplicationMode::Delta, Vec::new());
        leave.removed.push(RemovedRecord {
            entity_id: EntityId(2),
            kind: ComponentKind::VehicleOccupancy,
        });
        mirror.apply(&leave).unwrap();
        assert!(mirror.world.get::<Follow>(EntityId(2)).is_none());
        assert!(mirror.world.get::<VehicleOccupancy>(EntityId(2)).is_none());
    }

    #[test]
    fn undecodable_record_is_skipped() {
        let mut mirror = Mirror::new();
        let bad = ComponentRecord {
            entity_id: EntityId(1),
            kind: ComponentKind::Position,
            payload: vec![1],
        };
        let result = mirror.apply(&batch(
            ReplicationMode::Delta,
            vec![bad, record(2, Position::default())],
        ));
        assert!(result.is_err());
        assert!(mirror.world.contains(EntityId(2)));
        assert_eq!(mirror.last_tick(), Some(1));
    }
}
