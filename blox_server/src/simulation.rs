//! Simulation context and tick scheduler.
//!
//! Everything a system may touch lives in [`Simulation`] and is handed to each
//! system by `&mut`. Only the scheduler owns it; transport code reaches it
//! through the server loop between ticks.

use blox_shared::{
    config::WorldConfig,
    ecs::World,
    event::EventQueue,
    physics::{BasicPhysics, PhysicsConfig, PhysicsWorld},
    protocol::ReplicationBatch,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::trace;

use crate::{
    assets::MeshLoader,
    replication::{self, ReplicationSink},
    systems,
};

/// Shared state of one running world.
pub struct Simulation {
    pub world: World,
    pub events: EventQueue,
    pub physics: Box<dyn PhysicsWorld>,
    pub meshes: MeshLoader,
    pub config: WorldConfig,
    pub rng: StdRng,
    /// Number of completed ticks.
    pub tick: u64,
}

impl Simulation {
    pub fn new(config: WorldConfig, meshes: MeshLoader) -> Self {
        Self {
            world: World::new(),
            events: EventQueue::new(),
            physics: Box::new(BasicPhysics::new(PhysicsConfig::default())),
            meshes,
            config,
            rng: StdRng::from_entropy(),
            tick: 0,
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: WorldConfig, meshes: MeshLoader, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(config, meshes)
        }
    }

    pub fn with_physics(mut self, physics: Box<dyn PhysicsWorld>) -> Self {
        self.physics = physics;
        self
    }
}

/// One step of the tick pipeline.
///
/// Systems never fail across the tick boundary: per-entity problems are
/// logged inside `run` and the system moves on.
pub trait System: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, sim: &mut Simulation, dt: f32);
}

/// Fixed-order system pipeline.
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_default_systems()
    }
}

impl Scheduler {
    pub fn empty() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    /// State-mutating systems first, read-only transform sync last.
    pub fn with_default_systems() -> Self {
        let mut s = Self::empty();
        s.add(systems::destroy::DestroySystem);
        s.add(systems::input::InputSystem);
        s.add(systems::physics::ImpulseSystem);
        s.add(systems::physics::PhysicsStepSystem);
        s.add(systems::boundary::BoundaryCheckSystem);
        s.add(systems::randomize::RandomizeSystem);
        s.add(systems::convex_hull::ConvexHullColliderSystem::default());
        s.add(systems::vehicle::VehicleSystem);
        s.add(systems::vehicle::VehicleFollowSystem);
        s.add(systems::sync::SyncPositionSystem);
        s.add(systems::sync::SyncRotationSystem);
        s
    }

    pub fn add(&mut self, system: impl System + 'static) -> &mut Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Runs one tick: systems, then replication, then dirty-flag reset, then
    /// event flush. Returns the delta that was broadcast.
    pub fn step(
        &mut self,
        sim: &mut Simulation,
        dt: f32,
        sink: &mut dyn ReplicationSink,
    ) -> ReplicationBatch {
        sim.tick += 1;
        for system in &mut self.systems {
            trace!(system = system.name(), tick = sim.tick, "run");
            system.run(sim, dt);
        }

        let delta = replication::build_delta(&sim.world, &sim.events, sim.tick);
        sink.broadcast(&delta);
        sim.world.clear_dirty_flags();
        sim.events.flush();
        delta
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::assets::{MeshLoader, StaticMeshSource};
    use std::sync::Arc;

    pub fn sim() -> Simulation {
        Simulation::with_seed(
            WorldConfig::default(),
            MeshLoader::new(Arc::new(StaticMeshSource::default())),
            7,
        )
    }

    /// Records every broadcast batch.
    #[derive(Default)]
    pub struct VecSink(pub Vec<ReplicationBatch>);

    impl ReplicationSink for VecSink {
        fn broadcast(&mut self, batch: &ReplicationBatch) {
            self.0.push(batch.clone());
        }
    }
}
