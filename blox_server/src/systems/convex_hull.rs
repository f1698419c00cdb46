//! Convex-hull colliders built from mesh assets.
//!
//! Mesh fetches outlive a tick. A newly attached `ConvexHullCollider` puts its
//! entity on the waiting list; each tick the list is polled against the
//! [`MeshLoader`](crate::assets::MeshLoader) and entities whose mesh arrived get
//! their collider. Failed meshes are logged and the entity goes without.

use blox_shared::{
    ecs::{ConvexHullCollider, EntityId, PhysicsBody},
    event::EventKind,
};
use tracing::{debug, error, warn};

use crate::{
    assets::MeshStatus,
    simulation::{Simulation, System},
};

#[derive(Debug, Default)]
pub struct ConvexHullColliderSystem {
    waiting: Vec<(EntityId, String)>,
}

impl ConvexHullColliderSystem {
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }
}

impl System for ConvexHullColliderSystem {
    fn name(&self) -> &'static str {
        "convex_hull"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        for (id, hull) in sim
            .events
            .query_typed::<ConvexHullCollider>(EventKind::ComponentAdded)
        {
            if hull.collider.is_none() {
                self.waiting.push((id, hull.mesh_url.clone()));
            }
        }

        self.waiting.retain(|(id, url)| {
            if !sim.world.contains(*id) {
                return false;
            }
            match sim.meshes.poll(url) {
                MeshStatus::Pending => true,
                MeshStatus::Failed(reason) => {
                    error!(entity = ?id, %url, %reason, "Mesh unavailable, no collider");
                    false
                }
                MeshStatus::Ready(points) => {
                    let Some(body) = sim.world.get::<PhysicsBody>(*id).copied() else {
                        warn!(entity = ?id, "Collider mesh ready but entity has no body");
                        return false;
                    };
                    match sim.physics.attach_convex_hull(body.handle, &points) {
                        Some(collider) => {
                            if let Some(hull) = sim.world.get_mut::<ConvexHullCollider>(*id) {
                                hull.collider = Some(collider);
                            }
                            debug!(entity = ?id, %url, "Convex hull attached");
                        }
                        None => error!(entity = ?id, %url, "Degenerate mesh, no collider"),
                    }
                    false
                }
            }
        });
    }
}
