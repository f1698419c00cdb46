//! Domain error types.
//!
//! Errors that callers branch on are typed here; everything else travels as
//! `anyhow::Error` with context.

use thiserror::Error;

use crate::ecs::{ComponentKind, EntityId};

/// Registry lookup and replication errors.
///
/// These are expected during normal operation (a disconnect can race a late
/// event), so systems log them and move on to the next entity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EcsError {
    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),
    #[error("component {kind:?} not found on entity {entity:?}")]
    ComponentNotFound {
        entity: EntityId,
        kind: ComponentKind,
    },
}

/// Wire protocol errors. Inbound messages that fail with one of these are
/// dropped without notifying the sender.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
    #[error(transparent)]
    Ecs(#[from] EcsError),
}
