//! Copies body transforms back into components.
//!
//! Components are marked dirty only when the transform actually moved, so a
//! sleeping body costs nothing on the wire.

use blox_shared::ecs::{PhysicsBody, Position, Rotation};

use crate::simulation::{Simulation, System};

const EPSILON: f32 = 1e-4;

pub struct SyncPositionSystem;

impl System for SyncPositionSystem {
    fn name(&self) -> &'static str {
        "sync_position"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<PhysicsBody>() {
            let Some(body) = sim.world.get::<PhysicsBody>(id).copied() else {
                continue;
            };
            let Some(t) = sim.physics.translation(body.handle) else {
                continue;
            };
            let moved = sim
                .world
                .get::<Position>(id)
                .is_some_and(|p| !p.to_vec3().approx_eq(t, EPSILON));
            if moved {
                sim.world.modify::<Position, _>(id, |p| *p = t.into());
            }
        }
    }
}

pub struct SyncRotationSystem;

impl System for SyncRotationSystem {
    fn name(&self) -> &'static str {
        "sync_rotation"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<PhysicsBody>() {
            let Some(body) = sim.world.get::<PhysicsBody>(id).copied() else {
                continue;
            };
            let Some(q) = sim.physics.rotation(body.handle) else {
                continue;
            };
            let turned = sim
                .world
                .get::<Rotation>(id)
                .is_some_and(|r| !r.0.approx_eq(q, EPSILON));
            if turned {
                sim.world.modify::<Rotation, _>(id, |r| r.0 = q);
            }
        }
    }
}
