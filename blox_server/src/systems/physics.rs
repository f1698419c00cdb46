//! Feeding impulses into the physics world and stepping it.

use blox_shared::{
    ecs::{Impulse, PhysicsBody},
    math::Vec3,
};
use tracing::warn;

use crate::simulation::{Simulation, System};

/// Hands each pending `Impulse` to its body and resets it.
pub struct ImpulseSystem;

impl System for ImpulseSystem {
    fn name(&self) -> &'static str {
        "impulse"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<Impulse>() {
            let Some(body) = sim.world.get::<PhysicsBody>(id).copied() else {
                continue;
            };
            let Some(impulse) = sim.world.get_mut::<Impulse>(id) else {
                continue;
            };
            let push = std::mem::replace(&mut impulse.0, Vec3::ZERO);
            if push != Vec3::ZERO && !sim.physics.apply_impulse(body.handle, push) {
                warn!(entity = ?id, handle = ?body.handle, "Impulse on unknown body");
            }
        }
    }
}

pub struct PhysicsStepSystem;

impl System for PhysicsStepSystem {
    fn name(&self) -> &'static str {
        "physics_step"
    }

    fn run(&mut self, sim: &mut Simulation, dt: f32) {
        sim.physics.step(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::test_support::sim;
    use blox_shared::physics::{BodyDesc, Shape};

    #[test]
    fn impulse_is_consumed_and_moves_body() {
        let mut sim = sim();
        let e = sim.world.spawn();
        let handle = sim.physics.create_body(BodyDesc::dynamic(
            Vec3::new(0.0, 10.0, 0.0),
            Shape::Ball { radius: 0.5 },
        ));
        sim.world
            .add_component(&mut sim.events, e, PhysicsBody { handle })
            .unwrap();
        sim.world
            .add_component(&mut sim.events, e, Impulse(Vec3::new(4.0, 0.0, 0.0)))
            .unwrap();

        ImpulseSystem.run(&mut sim, 0.05);
        PhysicsStepSystem.run(&mut sim, 0.05);

        assert_eq!(sim.world.get::<Impulse>(e), Some(&Impulse(Vec3::ZERO)));
        assert!(sim.physics.translation(handle).unwrap().x > 0.0);
    }
}
