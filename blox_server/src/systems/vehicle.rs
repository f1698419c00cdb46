//! Vehicles: boarding, rosters and riding along.
//!
//! Boarding and leaving only attach or detach a `VehicleOccupancy` on the
//! player. [`VehicleSystem`] picks those changes up from the event queue later
//! in the same tick and brings the vehicle's roster and label in line, which
//! also covers occupants that vanish through a disconnect.

use blox_shared::{
    ecs::{
        ComponentKind, EntityId, PhysicsBody, Player, Position, Text, Vehicle, VehicleOccupancy,
    },
    event::EventKind,
    math::Vec3,
};
use tracing::{debug, info, warn};

use crate::simulation::{Simulation, System};

/// Where a player is put when stepping out.
const EXIT_OFFSET: Vec3 = Vec3::new(4.0, 0.0, 0.0);

/// Occupants sit this far above the vehicle's origin.
const SEAT_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Player pressed interact: leave the current vehicle, or board the nearest
/// one in reach.
pub fn handle_interaction(sim: &mut Simulation, player: EntityId) {
    if sim.world.get::<Player>(player).is_none() {
        return;
    }

    if let Some(occ) = sim.world.get::<VehicleOccupancy>(player).copied() {
        let inside = sim
            .world
            .get::<Vehicle>(occ.vehicle)
            .map_or(true, |v| v.contains(player));
        if inside {
            leave(sim, player, occ.vehicle);
        }
        return;
    }

    let Some(here) = sim.world.get::<Position>(player).map(|p| p.to_vec3()) else {
        return;
    };
    let reach = sim.config.interaction_radius;
    let nearest = sim
        .world
        .iter::<Vehicle>()
        .filter_map(|(id, _)| {
            let d = sim.world.get::<Position>(id)?.to_vec3().distance(here);
            (d <= reach).then_some((id, d))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id);

    if let Some(vehicle) = nearest {
        board(sim, player, vehicle);
    }
}

fn board(sim: &mut Simulation, player: EntityId, vehicle: EntityId) {
    if let Err(e) = sim
        .world
        .add_component(&mut sim.events, player, VehicleOccupancy { vehicle })
    {
        warn!(entity = ?player, error = %e, "Cannot board");
        return;
    }
    if let Some(body) = sim.world.get::<PhysicsBody>(player).copied() {
        sim.physics.set_enabled(body.handle, false);
    }
    debug!(entity = ?player, vehicle = ?vehicle, "Boarded");
}

fn leave(sim: &mut Simulation, player: EntityId, vehicle: EntityId) {
    if let Err(e) = sim
        .world
        .remove_component(&mut sim.events, player, ComponentKind::VehicleOccupancy)
    {
        warn!(entity = ?player, error = %e, "Cannot leave vehicle");
        return;
    }
    if let Some(body) = sim.world.get::<PhysicsBody>(player).copied() {
        sim.physics.set_enabled(body.handle, true);
        let base = sim
            .world
            .get::<Position>(vehicle)
            .or_else(|| sim.world.get::<Position>(player))
            .map(|p| p.to_vec3());
        if let Some(base) = base {
            sim.physics.set_translation(body.handle, base.add(EXIT_OFFSET));
        }
    }
    debug!(entity = ?player, vehicle = ?vehicle, "Left vehicle");
}

/// Keeps `Vehicle` rosters and labels in sync with occupancy changes.
pub struct VehicleSystem;

impl System for VehicleSystem {
    fn name(&self) -> &'static str {
        "vehicle"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        let exits: Vec<(EntityId, VehicleOccupancy)> = sim
            .events
            .query_typed::<VehicleOccupancy>(EventKind::ComponentRemoved)
            .map(|(e, o)| (e, *o))
            .collect();
        let entries: Vec<(EntityId, VehicleOccupancy)> = sim
            .events
            .query_typed::<VehicleOccupancy>(EventKind::ComponentAdded)
            .map(|(e, o)| (e, *o))
            .collect();

        for (occupant, occ) in exits {
            let changed = sim.world.modify::<Vehicle, _>(occ.vehicle, |v| {
                if v.driver == Some(occupant) {
                    v.driver = None;
                } else {
                    v.passengers.retain(|p| *p != occupant);
                }
            });
            match changed {
                Some(()) => {
                    info!(entity = ?occupant, vehicle = ?occ.vehicle, "Occupant left");
                    refresh_label(sim, occ.vehicle);
                }
                None => debug!(vehicle = ?occ.vehicle, "Exit from missing vehicle"),
            }
        }

        for (occupant, occ) in entries {
            // The occupant may already be gone again within this tick.
            let current = sim.world.get::<VehicleOccupancy>(occupant).copied();
            if current != Some(occ) {
                continue;
            }
            let changed = sim.world.modify::<Vehicle, _>(occ.vehicle, |v| {
                if v.contains(occupant) {
                    return;
                }
                if v.driver.is_none() {
                    v.driver = Some(occupant);
                } else {
                    v.passengers.push(occupant);
                }
            });
            match changed {
                Some(()) => {
                    info!(entity = ?occupant, vehicle = ?occ.vehicle, "Occupant entered");
                    refresh_label(sim, occ.vehicle);
                }
                None => warn!(entity = ?occupant, vehicle = ?occ.vehicle, "Boarded missing vehicle"),
            }
        }
    }
}

fn refresh_label(sim: &mut Simulation, vehicle: EntityId) {
    let Some(text) = sim.world.get::<Vehicle>(vehicle).map(Vehicle::display_text) else {
        return;
    };
    sim.world.modify::<Text, _>(vehicle, |t| t.text = text);
}

/// Moves occupants along with their vehicle. Occupancies pointing at a
/// vehicle that no longer exists are dropped and the body re-enabled.
pub struct VehicleFollowSystem;

impl System for VehicleFollowSystem {
    fn name(&self) -> &'static str {
        "vehicle_follow"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for id in sim.world.with::<VehicleOccupancy>() {
            let Some(occ) = sim.world.get::<VehicleOccupancy>(id).copied() else {
                continue;
            };
            let Some(seat) = sim
                .world
                .get::<Position>(occ.vehicle)
                .map(|p| p.to_vec3().add(SEAT_OFFSET))
            else {
                warn!(entity = ?id, vehicle = ?occ.vehicle, "Vehicle vanished, dropping occupancy");
                leave(sim, id, occ.vehicle);
                continue;
            };

            if let Some(body) = sim.world.get::<PhysicsBody>(id).copied() {
                sim.physics.set_translation(body.handle, seat);
            }
            let moved = sim
                .world
                .get::<Position>(id)
                .is_some_and(|p| !p.to_vec3().approx_eq(seat, 1e-4));
            if moved {
                sim.world.modify::<Position, _>(id, |p| *p = seat.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::test_support::sim;
    use blox_shared::physics::{BodyDesc, Shape};

    fn car(sim: &mut Simulation, at: Vec3) -> EntityId {
        let v = sim.world.spawn_networked();
        sim.world
            .add_component(&mut sim.events, v, Vehicle::default())
            .unwrap();
        sim.world
            .add_component(&mut sim.events, v, Position::from(at))
            .unwrap();
        sim.world
            .add_component(&mut sim.events, v, Text::new(Vehicle::default().display_text()))
            .unwrap();
        v
    }

    fn player(sim: &mut Simulation, at: Vec3) -> EntityId {
        let p = sim.world.spawn_networked();
        let handle = sim
            .physics
            .create_body(BodyDesc::dynamic(at, Shape::Ball { radius: 0.5 }));
        sim.world.add_component(&mut sim.events, p, Player).unwrap();
        sim.world
            .add_component(&mut sim.events, p, Position::from(at))
            .unwrap();
        sim.world
            .add_component(&mut sim.events, p, PhysicsBody { handle })
            .unwrap();
        p
    }

    fn roster(sim: &Simulation, v: EntityId) -> (Option<EntityId>, Vec<EntityId>, String) {
        let veh = sim.world.get::<Vehicle>(v).unwrap();
        let text = sim.world.get::<Text>(v).unwrap().text.clone();
        (veh.driver, veh.passengers.clone(), text)
    }

    #[test]
    fn boarding_and_leaving_updates_roster_and_text() {
        let mut sim = sim();
        let v = car(&mut sim, Vec3::ZERO);
        let a = player(&mut sim, Vec3::new(1.0, 0.0, 0.0));
        let b = player(&mut sim, Vec3::new(0.0, 0.0, 1.0));
        sim.events.flush();

        sim.world
            .add_component(&mut sim.events, a, VehicleOccupancy { vehicle: v })
            .unwrap();
        VehicleSystem.run(&mut sim, 0.05);
        sim.events.flush();
        assert_eq!(
            roster(&sim, v),
            (Some(a), vec![], "Driver: Yes | Passengers: 0".to_string())
        );

        sim.world
            .add_component(&mut sim.events, b, VehicleOccupancy { vehicle: v })
            .unwrap();
        VehicleSystem.run(&mut sim, 0.05);
        sim.events.flush();
        assert_eq!(
            roster(&sim, v),
            (Some(a), vec![b], "Driver: Yes | Passengers: 1".to_string())
        );

        sim.world
            .remove_component(&mut sim.events, a, ComponentKind::VehicleOccupancy)
            .unwrap();
        VehicleSystem.run(&mut sim, 0.05);
        assert_eq!(
            roster(&sim, v),
            (None, vec![b], "Driver: No | Passengers: 1".to_string())
        );
        assert!(sim
            .world
            .get_component(v, ComponentKind::Text)
            .unwrap()
            .is_dirty());
    }

    #[test]
    fn interact_boards_nearest_vehicle_in_reach_and_toggles_out() {
        let mut sim = sim();
        let near = car(&mut sim, Vec3::new(2.0, 0.0, 0.0));
        let _far = car(&mut sim, Vec3::new(50.0, 0.0, 0.0));
        let p = player(&mut sim, Vec3::ZERO);

        handle_interaction(&mut sim, p);
        assert_eq!(
            sim.world.get::<VehicleOccupancy>(p),
            Some(&VehicleOccupancy { vehicle: near })
        );
        VehicleSystem.run(&mut sim, 0.05);
        assert_eq!(sim.world.get::<Vehicle>(near).unwrap().driver, Some(p));

        let handle = sim.world.get::<PhysicsBody>(p).unwrap().handle;
        handle_interaction(&mut sim, p);
        assert!(sim.world.get::<VehicleOccupancy>(p).is_none());
        assert_eq!(
            sim.physics.translation(handle),
            Some(Vec3::new(2.0, 0.0, 0.0).add(EXIT_OFFSET))
        );
    }

    #[test]
    fn nothing_in_reach_means_no_boarding() {
        let mut sim = sim();
        car(&mut sim, Vec3::new(100.0, 0.0, 0.0));
        let p = player(&mut sim, Vec3::ZERO);
        handle_interaction(&mut sim, p);
        assert!(sim.world.get::<VehicleOccupancy>(p).is_none());
    }

    #[test]
    fn occupants_follow_and_stale_occupancy_is_dropped() {
        let mut sim = sim();
        let v = car(&mut sim, Vec3::new(5.0, 1.0, 5.0));
        let p = player(&mut sim, Vec3::ZERO);
        sim.world
            .add_component(&mut sim.events, p, VehicleOccupancy { vehicle: v })
            .unwrap();

        VehicleFollowSystem.run(&mut sim, 0.05);
        assert_eq!(
            sim.world.get::<Position>(p).unwrap().to_vec3(),
            Vec3::new(5.0, 2.0, 5.0)
        );

        sim.world.despawn(&mut sim.events, v).unwrap();
        VehicleFollowSystem.run(&mut sim, 0.05);
        assert!(sim.world.get::<VehicleOccupancy>(p).is_none());
    }
}
