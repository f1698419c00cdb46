//! Player input.
//!
//! The dispatcher only queues raw [`InputMessage`]s on the player's
//! `InputQueue`. Here, at the start of the tick, they become an `Impulse` on
//! the controlled body plus, for `interact`, a vehicle interaction.

use blox_shared::{
    ecs::{EntityId, Impulse, InputQueue, PhysicsBody, Vehicle, VehicleOccupancy},
    math::{Quat, Vec3},
    protocol::InputMessage,
};
use tracing::warn;

use crate::{
    simulation::{Simulation, System},
    systems::vehicle,
};

pub struct InputSystem;

impl System for InputSystem {
    fn name(&self) -> &'static str {
        "input"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<InputQueue>() {
            let pending = match sim.world.get_mut::<InputQueue>(id) {
                Some(queue) => std::mem::take(&mut queue.pending),
                None => continue,
            };
            let Some(latest) = pending.last().copied() else {
                continue;
            };

            apply_movement(sim, id, &latest);
            if pending.iter().any(|i| i.interact) {
                vehicle::handle_interaction(sim, id);
            }
        }
    }
}

/// Horizontal push for the held keys, facing `angle` (0 looks down -z).
pub fn movement_direction(input: &InputMessage) -> Vec3 {
    let (sin, cos) = input.angle.sin_cos();
    let forward = Vec3::new(-sin, 0.0, -cos);
    let right = Vec3::new(cos, 0.0, -sin);
    let mut dir = Vec3::ZERO;
    if input.up {
        dir = dir.add(forward);
    }
    if input.down {
        dir = dir.sub(forward);
    }
    if input.right {
        dir = dir.add(right);
    }
    if input.left {
        dir = dir.sub(right);
    }
    dir.normalize_or_zero()
}

fn apply_movement(sim: &mut Simulation, player: EntityId, input: &InputMessage) {
    let cfg = &sim.config;
    let mut push = movement_direction(input).scale(cfg.move_impulse);
    if input.space {
        push.y += cfg.jump_impulse;
    }

    // Drivers steer their vehicle; passengers only ride along.
    let target = match sim.world.get::<VehicleOccupancy>(player).copied() {
        Some(occ) => match sim.world.get::<Vehicle>(occ.vehicle) {
            Some(v) if v.driver == Some(player) => occ.vehicle,
            _ => return,
        },
        None => {
            if let Some(body) = sim.world.get::<PhysicsBody>(player).copied() {
                sim.physics.set_rotation(body.handle, Quat::from_yaw(input.angle));
            }
            player
        }
    };

    if push == Vec3::ZERO {
        return;
    }
    match sim.world.get_mut::<Impulse>(target) {
        Some(impulse) => impulse.0 = impulse.0.add(push),
        None => {
            if let Err(e) = sim.world.add_component(&mut sim.events, target, Impulse(push)) {
                warn!(entity = ?target, error = %e, "Cannot apply input");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::test_support::sim;
    use std::f32::consts::FRAC_PI_2;

    fn input(f: impl FnOnce(&mut InputMessage)) -> InputMessage {
        let mut i = InputMessage::default();
        f(&mut i);
        i
    }

    #[test]
    fn direction_follows_camera_yaw() {
        let fwd = movement_direction(&input(|i| i.up = true));
        assert!(fwd.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-6));

        let turned = movement_direction(&input(|i| {
            i.up = true;
            i.angle = FRAC_PI_2;
        }));
        assert!(turned.approx_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-6));

        let diag = movement_direction(&input(|i| {
            i.up = true;
            i.right = true;
        }));
        assert!((diag.len() - 1.0).abs() < 1e-6);
        assert_eq!(movement_direction(&InputMessage::default()), Vec3::ZERO);
    }

    #[test]
    fn queued_input_becomes_impulse_and_queue_drains() {
        let mut sim = sim();
        let p = sim.world.spawn_networked();
        sim.world
            .add_component(
                &mut sim.events,
                p,
                InputQueue {
                    pending: vec![input(|i| i.space = true)],
                },
            )
            .unwrap();

        InputSystem.run(&mut sim, 0.05);
        let impulse = sim.world.get::<Impulse>(p).unwrap();
        assert_eq!(impulse.0.y, sim.config.jump_impulse);
        assert!(sim.world.get::<InputQueue>(p).unwrap().pending.is_empty());
    }

    #[test]
    fn passenger_input_does_not_move_anything() {
        let mut sim = sim();
        let driver = sim.world.spawn_networked();
        let rider = sim.world.spawn_networked();
        let car = sim.world.spawn_networked();
        sim.world
            .add_component(
                &mut sim.events,
                car,
                Vehicle {
                    driver: Some(driver),
                    passengers: vec![rider],
                },
            )
            .unwrap();
        for who in [driver, rider] {
            sim.world
                .add_component(&mut sim.events, who, VehicleOccupancy { vehicle: car })
                .unwrap();
            sim.world
                .add_component(
                    &mut sim.events,
                    who,
                    InputQueue {
                        pending: vec![input(|i| i.up = true)],
                    },
                )
                .unwrap();
        }

        InputSystem.run(&mut sim, 0.05);
        assert!(sim.world.get::<Impulse>(rider).is_none());
        assert!(sim.world.get::<Impulse>(driver).is_none());
        let pushed = sim.world.get::<Impulse>(car).unwrap().0;
        assert!((pushed.len() - sim.config.move_impulse).abs() < 1e-6);
    }
}
