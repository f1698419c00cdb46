//! Entity teardown.
//!
//! An entity carrying the `Destroyed` marker is torn down in two steps so
//! clients see the marker before the entity disappears:
//!
//! 1. While the marker is still unsent, every other component is detached
//!    (publishing removal events other systems react to this tick) and the
//!    physics body is released. Replication then ships the marker.
//! 2. On a later tick, with the marker sent, the entity is despawned.
//!
//! Entities nobody replicates skip straight to step 2.

use blox_shared::ecs::{ComponentKind, Destroyed, EntityId, PhysicsBody};
use tracing::{debug, warn};

use crate::simulation::{Simulation, System};

pub struct DestroySystem;

impl System for DestroySystem {
    fn name(&self) -> &'static str {
        "destroy"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<Destroyed>() {
            release_body(sim, id);

            let Some(entity) = sim.world.get_entity_by_id(id) else {
                continue;
            };
            let marker_sent = entity
                .component(ComponentKind::Destroyed)
                .is_some_and(|c| !c.is_dirty());
            if marker_sent || entity.network().is_none() {
                if let Err(e) = sim.world.despawn(&mut sim.events, id) {
                    warn!(entity = ?id, error = %e, "Despawn failed");
                }
                continue;
            }

            let doomed: Vec<ComponentKind> = entity
                .components()
                .map(|c| c.kind())
                .filter(|k| *k != ComponentKind::Destroyed)
                .collect();
            for kind in doomed {
                if let Err(e) = sim.world.remove_component(&mut sim.events, id, kind) {
                    warn!(entity = ?id, ?kind, error = %e, "Detach failed");
                }
            }
            debug!(entity = ?id, "Entity stripped, despawning after broadcast");
        }
    }
}

fn release_body(sim: &mut Simulation, id: EntityId) {
    if let Some(body) = sim.world.get::<PhysicsBody>(id).copied() {
        sim.physics.remove_body(body.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        replication::build_delta,
        simulation::test_support::sim,
    };
    use blox_shared::{
        ecs::{Position, Size},
        event::EventKind,
        math::Vec3,
        physics::{BodyDesc, Shape},
    };

    #[test]
    fn networked_entity_is_stripped_then_despawned() {
        let mut sim = sim();
        let e = sim.world.spawn_networked();
        let handle = sim
            .physics
            .create_body(BodyDesc::dynamic(Vec3::ZERO, Shape::Ball { radius: 1.0 }));
        sim.world
            .add_component(&mut sim.events, e, Position::default())
            .unwrap();
        sim.world
            .add_component(&mut sim.events, e, PhysicsBody { handle })
            .unwrap();
        sim.world.clear_dirty_flags();
        sim.events.flush();

        sim.world
            .add_component(&mut sim.events, e, Destroyed)
            .unwrap();
        DestroySystem.run(&mut sim, 0.05);

        assert!(sim.world.contains(e));
        let left: Vec<_> = sim
            .world
            .get_entity_by_id(e)
            .unwrap()
            .components()
            .map(|c| c.kind())
            .collect();
        assert_eq!(left, vec![ComponentKind::Destroyed]);
        assert_eq!(sim.physics.body_count(), 0);
        assert_eq!(
            sim.events
                .query(EventKind::ComponentRemoved, ComponentKind::Position)
                .count(),
            1
        );

        let delta = build_delta(&sim.world, &sim.events, 1);
        assert!(delta
            .records
            .iter()
            .any(|r| r.entity_id == e && r.kind == ComponentKind::Destroyed));
        sim.world.clear_dirty_flags();
        sim.events.flush();

        DestroySystem.run(&mut sim, 0.05);
        assert!(!sim.world.contains(e));
    }

    #[test]
    fn local_entity_is_despawned_at_once() {
        let mut sim = sim();
        let e = sim.world.spawn();
        sim.world
            .add_component(&mut sim.events, e, Size::uniform(1.0))
            .unwrap();
        sim.world
            .add_component(&mut sim.events, e, Destroyed)
            .unwrap();
        DestroySystem.run(&mut sim, 0.05);
        assert!(!sim.world.contains(e));
    }
}
