//! Physics abstraction.
//!
//! The simulation talks to physics only through [`PhysicsWorld`]. Bodies are
//! addressed by opaque handles stored in the `PhysicsBody` component; systems
//! feed impulses in and read transforms back out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::math::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColliderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Integrated every step.
    Dynamic,
    /// Never moves on its own.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
}

impl Shape {
    fn half_height(&self) -> f32 {
        match *self {
            Shape::Cuboid { half_extents } => half_extents.y,
            Shape::Ball { radius } => radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub translation: Vec3,
    pub rotation: Quat,
    pub shape: Shape,
    pub mass: f32,
}

impl BodyDesc {
    pub fn dynamic(translation: Vec3, shape: Shape) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            translation,
            rotation: Quat::IDENTITY,
            shape,
            mass: 1.0,
        }
    }

    pub fn fixed(translation: Vec3, shape: Shape) -> Self {
        Self {
            kind: BodyKind::Fixed,
            ..Self::dynamic(translation, shape)
        }
    }
}

/// Physics stepper. Returns `false`/`None` for unknown handles.
pub trait PhysicsWorld: Send {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle;

    fn remove_body(&mut self, handle: BodyHandle) -> bool;

    fn translation(&self, handle: BodyHandle) -> Option<Vec3>;

    fn rotation(&self, handle: BodyHandle) -> Option<Quat>;

    /// Teleports the body and zeroes its velocity.
    fn set_translation(&mut self, handle: BodyHandle, translation: Vec3) -> bool;

    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) -> bool;

    /// Disabled bodies are neither integrated nor collided.
    fn set_enabled(&mut self, handle: BodyHandle, enabled: bool) -> bool;

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> bool;

    /// Builds a convex-hull collider from mesh vertices and attaches it.
    /// `None` if the body is unknown or the point cloud is degenerate.
    fn attach_convex_hull(&mut self, handle: BodyHandle, points: &[Vec3]) -> Option<ColliderHandle>;

    fn step(&mut self, dt: f32);

    fn body_count(&self) -> usize;
}

/// Physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    /// Height of the ground plane.
    pub ground_y: f32,
    /// The ground covers `[-extent, extent]` on x and z; past it bodies fall.
    pub ground_half_extent: f32,
    /// Fraction of velocity lost per second.
    pub linear_damping: f32,
    /// Speed below which a grounded body goes to sleep.
    pub sleep_speed: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            ground_y: 0.0,
            ground_half_extent: 50.0,
            linear_damping: 0.5,
            sleep_speed: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    kind: BodyKind,
    translation: Vec3,
    rotation: Quat,
    velocity: Vec3,
    inv_mass: f32,
    half_height: f32,
    enabled: bool,
    sleeping: bool,
    colliders: Vec<ColliderHandle>,
}

/// Point-mass integrator with a finite ground plane.
#[derive(Debug, Default)]
pub struct BasicPhysics {
    config: PhysicsConfig,
    bodies: BTreeMap<BodyHandle, Body>,
    next_body: u32,
    next_collider: u32,
}

impl BasicPhysics {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn is_sleeping(&self, handle: BodyHandle) -> Option<bool> {
        self.bodies.get(&handle).map(|b| b.sleeping)
    }

    pub fn is_enabled(&self, handle: BodyHandle) -> Option<bool> {
        self.bodies.get(&handle).map(|b| b.enabled)
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.velocity)
    }

    fn over_ground(&self, p: Vec3) -> bool {
        let e = self.config.ground_half_extent;
        p.x.abs() <= e && p.z.abs() <= e
    }
}

impl PhysicsWorld for BasicPhysics {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        self.next_body += 1;
        let handle = BodyHandle(self.next_body);
        let inv_mass = if desc.mass > 0.0 { 1.0 / desc.mass } else { 0.0 };
        self.bodies.insert(
            handle,
            Body {
                kind: desc.kind,
                translation: desc.translation,
                rotation: desc.rotation,
                velocity: Vec3::ZERO,
                inv_mass,
                half_height: desc.shape.half_height(),
                enabled: true,
                sleeping: false,
                colliders: Vec::new(),
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.remove(&handle).is_some()
    }

    fn translation(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.translation)
    }

    fn rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.bodies.get(&handle).map(|b| b.rotation)
    }

    fn set_translation(&mut self, handle: BodyHandle, translation: Vec3) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        body.translation = translation;
        body.velocity = Vec3::ZERO;
        body.sleeping = false;
        true
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        body.rotation = rotation;
        true
    }

    fn set_enabled(&mut self, handle: BodyHandle, enabled: bool) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        body.enabled = enabled;
        body.sleeping = false;
        if !enabled {
            body.velocity = Vec3::ZERO;
        }
        true
    }

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        if body.kind == BodyKind::Dynamic && body.enabled {
            body.velocity = body.velocity.add(impulse.scale(body.inv_mass));
            body.sleeping = false;
        }
        true
    }

    fn attach_convex_hull(&mut self, handle: BodyHandle, points: &[Vec3]) -> Option<ColliderHandle> {
        // A hull needs volume: at least four points spanning all three axes.
        if points.len() < 4 {
            return None;
        }
        let (mut min, mut max) = (points[0], points[0]);
        for p in points {
            min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let extent = max.sub(min);
        if extent.x <= f32::EPSILON || extent.y <= f32::EPSILON || extent.z <= f32::EPSILON {
            return None;
        }

        let body = self.bodies.get_mut(&handle)?;
        self.next_collider += 1;
        let collider = ColliderHandle(self.next_collider);
        body.half_height = body.half_height.max(extent.y * 0.5);
        body.colliders.push(collider);
        Some(collider)
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let cfg = self.config;
        let damping = (1.0 - cfg.linear_damping * dt).clamp(0.0, 1.0);
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        for handle in handles {
            let over_ground = match self.bodies.get(&handle) {
                Some(b) => self.over_ground(b.translation),
                None => continue,
            };
            let Some(body) = self.bodies.get_mut(&handle) else {
                continue;
            };
            if body.kind != BodyKind::Dynamic || !body.enabled || body.sleeping {
                continue;
            }

            body.velocity = body.velocity.add(cfg.gravity.scale(dt)).scale(damping);
            body.translation = body.translation.add(body.velocity.scale(dt));

            let floor = cfg.ground_y + body.half_height;
            let grounded = over_ground && body.translation.y <= floor && body.translation.y > floor - 1.0;
            if grounded {
                body.translation.y = floor;
                if body.velocity.y < 0.0 {
                    body.velocity.y = 0.0;
                }
                if body.velocity.len() < cfg.sleep_speed {
                    body.velocity = Vec3::ZERO;
                    body.sleeping = true;
                }
            }
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
