//! Component model.
//!
//! Components are plain data records with no behavior. Every concrete record
//! type has a matching [`ComponentKind`] tag; the tag is what the registry,
//! the event queue and the wire protocol key on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ecs::EntityId,
    math::{Quat, Vec3},
    physics::{BodyHandle, ColliderHandle},
    protocol::{ClientId, InputMessage},
};

/// Closed set of component kinds.
///
/// The discriminants are part of the wire protocol; append new kinds at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentKind {
    Position = 0,
    Rotation = 1,
    Size = 2,
    Color = 3,
    Text = 4,
    Player = 5,
    Vehicle = 6,
    VehicleOccupancy = 7,
    Destroyed = 8,
    ChatList = 9,
    Follow = 10,
    Randomize = 11,
    SpawnPosition = 12,
    Connection = 13,
    PhysicsBody = 14,
    Impulse = 15,
    InputQueue = 16,
    ConvexHullCollider = 17,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 18] = [
        ComponentKind::Position,
        ComponentKind::Rotation,
        ComponentKind::Size,
        ComponentKind::Color,
        ComponentKind::Text,
        ComponentKind::Player,
        ComponentKind::Vehicle,
        ComponentKind::VehicleOccupancy,
        ComponentKind::Destroyed,
        ComponentKind::ChatList,
        ComponentKind::Follow,
        ComponentKind::Randomize,
        ComponentKind::SpawnPosition,
        ComponentKind::Connection,
        ComponentKind::PhysicsBody,
        ComponentKind::Impulse,
        ComponentKind::InputQueue,
        ComponentKind::ConvexHullCollider,
    ];

    /// Whether components of this kind are mirrored to clients.
    pub const fn is_networked(self) -> bool {
        matches!(
            self,
            ComponentKind::Position
                | ComponentKind::Rotation
                | ComponentKind::Size
                | ComponentKind::Color
                | ComponentKind::Text
                | ComponentKind::Player
                | ComponentKind::Vehicle
                | ComponentKind::VehicleOccupancy
                | ComponentKind::Destroyed
                | ComponentKind::ChatList
        )
    }
}

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Position {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rotation(pub Quat);

/// Box extents (or sphere diameter on all three axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl Size {
    pub fn uniform(s: f32) -> Self {
        Self {
            width: s,
            height: s,
            depth: s,
        }
    }
}

/// CSS-style color string, e.g. `#ff8800`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub String);

/// Floating label rendered above an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    pub offset: Vec3,
    pub display_distance: f32,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset: Vec3::new(0.0, 2.0, 0.0),
            display_distance: 50.0,
        }
    }
}

/// Marks an entity controlled by a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Player;

/// Vehicle roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Vehicle {
    pub driver: Option<EntityId>,
    pub passengers: Vec<EntityId>,
}

impl Vehicle {
    pub fn contains(&self, entity: EntityId) -> bool {
        self.driver == Some(entity) || self.passengers.contains(&entity)
    }

    /// Label shown above the vehicle.
    pub fn display_text(&self) -> String {
        format!(
            "Driver: {} | Passengers: {}",
            if self.driver.is_some() { "Yes" } else { "No" },
            self.passengers.len()
        )
    }
}

/// The owning entity sits in `vehicle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleOccupancy {
    pub vehicle: EntityId,
}

/// Destruction marker. Replicated so clients drop the entity; the server
/// despawns the entity on the following tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Destroyed;

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub author: EntityId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Recent chat history held by the chat entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatList {
    pub messages: Vec<ChatEntry>,
}

/// Keep the owning entity at the target's position (client-side camera and
/// vehicle attachment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub target: EntityId,
}

/// Periodically re-roll size and color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Randomize;

/// Where the entity returns to after falling out of the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SpawnPosition(pub Vec3);

/// Transport-facing link from a player entity to its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub client_id: ClientId,
}

/// Handle of the body the physics world simulates for this entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicsBody {
    pub handle: BodyHandle,
}

/// Impulse applied to the body on the next physics step, then reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Impulse(pub Vec3);

/// Inputs received between ticks, consumed by the input system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputQueue {
    pub pending: Vec<InputMessage>,
}

/// Collider built from the convex hull of a mesh asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvexHullCollider {
    pub mesh_url: String,
    pub collider: Option<ColliderHandle>,
}

impl ConvexHullCollider {
    pub fn new(mesh_url: impl Into<String>) -> Self {
        Self {
            mesh_url: mesh_url.into(),
            collider: None,
        }
    }
}

/// Implemented by every concrete component record.
pub trait ComponentType: Into<ComponentData> + Sized + 'static {
    const KIND: ComponentKind;

    fn from_data(data: &ComponentData) -> Option<&Self>;

    fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self>;
}

macro_rules! component_data {
    ($($ty:ident),+ $(,)?) => {
        /// Tagged union of every component record.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum ComponentData {
            $($ty($ty),)+
        }

        impl ComponentData {
            pub fn kind(&self) -> ComponentKind {
                match self {
                    $(ComponentData::$ty(_) => ComponentKind::$ty,)+
                }
            }

            /// Serializes the record's fields without the kind tag.
            pub fn encode_payload(&self) -> bincode::Result<Vec<u8>> {
                match self {
                    $(ComponentData::$ty(c) => bincode::serialize(c),)+
                }
            }

            /// Inverse of [`ComponentData::encode_payload`].
            pub fn decode_payload(kind: ComponentKind, payload: &[u8]) -> bincode::Result<Self> {
                match kind {
                    $(ComponentKind::$ty => bincode::deserialize::<$ty>(payload).map(ComponentData::$ty),)+
                }
            }
        }

        $(
            impl From<$ty> for ComponentData {
                fn from(c: $ty) -> Self {
                    ComponentData::$ty(c)
                }
            }

            impl ComponentType for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;

                fn from_data(data: &ComponentData) -> Option<&Self> {
                    match data {
                        ComponentData::$ty(c) => Some(c),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self> {
                    match data {
                        ComponentData::$ty(c) => Some(c),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

component_data!(
    Position,
    Rotation,
    Size,
    Color,
    Text,
    Player,
    Vehicle,
    VehicleOccupancy,
    Destroyed,
    ChatList,
    Follow,
    Randomize,
    SpawnPosition,
    Connection,
    PhysicsBody,
    Impulse,
    InputQueue,
    ConvexHullCollider,
);

/// A component instance attached to an entity.
///
/// `dirty` means "changed since the last replication pass". New instances
/// start dirty so their first state is always sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    entity_id: EntityId,
    dirty: bool,
    data: ComponentData,
}

impl Component {
    pub fn new(entity_id: EntityId, data: impl Into<ComponentData>) -> Self {
        Self {
            entity_id,
            dirty: true,
            data: data.into(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn kind(&self) -> ComponentKind {
        self.data.kind()
    }

    pub fn data(&self) -> &ComponentData {
        &self.data
    }

    /// Mutable access. Does not touch the dirty flag; see [`Component::mark_dirty`].
    pub fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }

    pub fn get<T: ComponentType>(&self) -> Option<&T> {
        T::from_data(&self.data)
    }

    pub fn get_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        T::from_data_mut(&mut self.data)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
