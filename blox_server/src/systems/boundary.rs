//! Returns bodies that fell out of the world to their spawn point.

use blox_shared::ecs::{PhysicsBody, SpawnPosition};
use tracing::debug;

use crate::simulation::{Simulation, System};

pub struct BoundaryCheckSystem;

impl System for BoundaryCheckSystem {
    fn name(&self) -> &'static str {
        "boundary_check"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        let limit = sim.config.fall_limit_y;
        for id in sim.world.with::<SpawnPosition>() {
            let Some(body) = sim.world.get::<PhysicsBody>(id).copied() else {
                continue;
            };
            let Some(spawn) = sim.world.get::<SpawnPosition>(id).copied() else {
                continue;
            };
            let fell = sim
                .physics
                .translation(body.handle)
                .is_some_and(|t| t.y < limit);
            if fell {
                debug!(entity = ?id, "Out of bounds, respawning");
                sim.physics.set_translation(body.handle, spawn.0);
            }
        }
    }
}
