//! Prefabs and the sample scene.

use blox_shared::{
    ecs::{
        ChatList, Color, ComponentData, Connection, ConvexHullCollider, EntityId, Impulse,
        InputQueue, PhysicsBody, Player, Position, Randomize, Rotation, Size, SpawnPosition, Text,
        Vehicle,
    },
    error::EcsError,
    math::Vec3,
    physics::{BodyDesc, Shape},
    protocol::ClientId,
};
use rand::Rng;
use tracing::info;

use crate::{simulation::Simulation, systems::randomize::random_color};

/// Mesh the sample vehicle's collider is built from, relative to the assets dir.
pub const VEHICLE_MESH: &str = "car.json";

fn attach(
    sim: &mut Simulation,
    id: EntityId,
    parts: Vec<ComponentData>,
) -> Result<(), EcsError> {
    for part in parts {
        sim.world.add_component(&mut sim.events, id, part)?;
    }
    Ok(())
}

/// Networked entity with a dynamic body and the usual transform components.
fn spawn_body(
    sim: &mut Simulation,
    at: Vec3,
    size: Size,
    shape: Shape,
    color: Color,
) -> Result<EntityId, EcsError> {
    let id = sim.world.spawn_networked();
    let handle = sim.physics.create_body(BodyDesc::dynamic(at, shape));
    attach(
        sim,
        id,
        vec![
            Position::from(at).into(),
            Rotation::default().into(),
            size.into(),
            color.into(),
            PhysicsBody { handle }.into(),
            Impulse::default().into(),
            SpawnPosition(at).into(),
        ],
    )?;
    Ok(id)
}

pub fn spawn_chat(sim: &mut Simulation) -> Result<EntityId, EcsError> {
    let id = sim.world.spawn_networked();
    attach(sim, id, vec![ChatList::default().into()])?;
    Ok(id)
}

pub fn spawn_ground(sim: &mut Simulation, half_extent: f32) -> Result<EntityId, EcsError> {
    let id = sim.world.spawn_networked();
    let half = Vec3::new(half_extent, 0.5, half_extent);
    let at = Vec3::new(0.0, -0.5, 0.0);
    let handle = sim.physics.create_body(BodyDesc::fixed(
        at,
        Shape::Cuboid { half_extents: half },
    ));
    attach(
        sim,
        id,
        vec![
            Position::from(at).into(),
            Size {
                width: half.x * 2.0,
                height: half.y * 2.0,
                depth: half.z * 2.0,
            }
            .into(),
            Color("#3a7d44".into()).into(),
            PhysicsBody { handle }.into(),
        ],
    )?;
    Ok(id)
}

pub fn spawn_cube(sim: &mut Simulation, at: Vec3, side: f32) -> Result<EntityId, EcsError> {
    let half = side * 0.5;
    spawn_body(
        sim,
        at,
        Size::uniform(side),
        Shape::Cuboid {
            half_extents: Vec3::new(half, half, half),
        },
        Color("#ff8800".into()),
    )
}

pub fn spawn_sphere(sim: &mut Simulation, at: Vec3, radius: f32) -> Result<EntityId, EcsError> {
    spawn_body(
        sim,
        at,
        Size::uniform(radius * 2.0),
        Shape::Ball { radius },
        Color("#2277ff".into()),
    )
}

/// Vehicle with an empty roster, its label and a hull collider from `mesh_url`.
pub fn spawn_vehicle(sim: &mut Simulation, at: Vec3, mesh_url: &str) -> Result<EntityId, EcsError> {
    let size = Size {
        width: 2.0,
        height: 1.0,
        depth: 4.0,
    };
    let id = spawn_body(
        sim,
        at,
        size,
        Shape::Cuboid {
            half_extents: Vec3::new(1.0, 0.5, 2.0),
        },
        Color("#cc2222".into()),
    )?;
    let roster = Vehicle::default();
    let label = Text::new(roster.display_text());
    attach(
        sim,
        id,
        vec![
            roster.into(),
            label.into(),
            ConvexHullCollider::new(mesh_url).into(),
        ],
    )?;
    Ok(id)
}

/// Player entity for a new connection, dropped at a random point above the
/// spawn area.
pub fn spawn_player(sim: &mut Simulation, client_id: ClientId) -> Result<EntityId, EcsError> {
    let range = sim.config.spawn_range_xz.max(0.0);
    let at = Vec3::new(
        sim.rng.gen_range(-range..=range),
        sim.config.spawn_height + sim.rng.gen_range(0.0..2.0),
        sim.rng.gen_range(-range..=range),
    );
    let color = random_color(&mut sim.rng);
    let id = spawn_body(
        sim,
        at,
        Size::uniform(1.0),
        Shape::Ball { radius: 0.5 },
        color,
    )?;
    attach(
        sim,
        id,
        vec![
            Player.into(),
            Connection { client_id }.into(),
            InputQueue::default().into(),
            Text::new(format!("Player {}", id.0)).into(),
        ],
    )?;
    Ok(id)
}

/// Entities of the sample scene worth keeping a handle on.
#[derive(Debug, Clone, Copy)]
pub struct SampleWorld {
    pub chat: EntityId,
    pub ground: EntityId,
    pub vehicle: EntityId,
}

/// Builds the initial scene.
pub fn populate(sim: &mut Simulation) -> Result<SampleWorld, EcsError> {
    let chat = spawn_chat(sim)?;
    let ground = spawn_ground(sim, 50.0)?;

    spawn_cube(sim, Vec3::new(0.0, 10.0, 0.0), 1.0)?;
    spawn_cube(sim, Vec3::new(2.0, 10.0, 0.0), 1.0)?;
    let random_cube = spawn_cube(sim, Vec3::new(-2.0, 10.0, 0.0), 1.0)?;
    sim.world.add_component(&mut sim.events, random_cube, Randomize)?;

    spawn_sphere(sim, Vec3::new(0.0, 30.0, 0.0), 1.0)?;
    let random_sphere = spawn_sphere(sim, Vec3::new(3.0, 30.0, 0.0), 1.2)?;
    sim.world.add_component(&mut sim.events, random_sphere, Randomize)?;
    spawn_sphere(sim, Vec3::new(10.0, 30.0, 0.0), 4.0)?;

    let vehicle = spawn_vehicle(sim, Vec3::new(5.0, 2.0, 5.0), VEHICLE_MESH)?;

    info!(entities = sim.world.len(), "Sample world populated");
    Ok(SampleWorld {
        chat,
        ground,
        vehicle,
    })
}
