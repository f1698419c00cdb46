//! Replication envelope.
//!
//! A [`NetworkComponent`] does not hold component copies. It records which
//! kinds of its entity are mirrored to clients; replication reads those kinds
//! straight out of the entity's own storage, so both views always see the same
//! instance.

use super::ComponentKind;

bitflags::bitflags! {
    /// Set of replicated component kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KindMask: u32 {
        const POSITION = 1 << ComponentKind::Position as u32;
        const ROTATION = 1 << ComponentKind::Rotation as u32;
        const SIZE = 1 << ComponentKind::Size as u32;
        const COLOR = 1 << ComponentKind::Color as u32;
        const TEXT = 1 << ComponentKind::Text as u32;
        const PLAYER = 1 << ComponentKind::Player as u32;
        const VEHICLE = 1 << ComponentKind::Vehicle as u32;
        const VEHICLE_OCCUPANCY = 1 << ComponentKind::VehicleOccupancy as u32;
        const DESTROYED = 1 << ComponentKind::Destroyed as u32;
        const CHAT_LIST = 1 << ComponentKind::ChatList as u32;
    }
}

impl KindMask {
    /// Flag for `kind`, or `None` when the kind is never replicated.
    pub fn of(kind: ComponentKind) -> Option<Self> {
        if kind.is_networked() {
            Some(Self::from_bits_retain(1 << kind as u32))
        } else {
            None
        }
    }
}

/// Per-entity replication envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkComponent {
    tracked: KindMask,
}

impl NetworkComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `kind`. Returns false for kinds that are not replicated.
    pub fn track(&mut self, kind: ComponentKind) -> bool {
        match KindMask::of(kind) {
            Some(flag) => {
                self.tracked.insert(flag);
                true
            }
            None => false,
        }
    }

    /// Stops tracking `kind`. Returns whether it was tracked.
    pub fn untrack(&mut self, kind: ComponentKind) -> bool {
        match KindMask::of(kind) {
            Some(flag) if self.tracked.contains(flag) => {
                self.tracked.remove(flag);
                true
            }
            _ => false,
        }
    }

    pub fn is_tracked(&self, kind: ComponentKind) -> bool {
        KindMask::of(kind).is_some_and(|flag| self.tracked.contains(flag))
    }

    /// Tracked kinds in wire order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        ComponentKind::ALL
            .into_iter()
            .filter(move |kind| self.is_tracked(*kind))
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_kinds_are_never_tracked() {
        let mut net = NetworkComponent::new();
        assert!(!net.track(ComponentKind::PhysicsBody));
        assert!(!net.is_tracked(ComponentKind::PhysicsBody));
        assert!(net.is_empty());
    }

    #[test]
    fn track_and_untrack() {
        let mut net = NetworkComponent::new();
        assert!(net.track(ComponentKind::Text));
        assert!(net.track(ComponentKind::Position));
        assert_eq!(
            net.kinds().collect::<Vec<_>>(),
            vec![ComponentKind::Position, ComponentKind::Text]
        );
        assert!(net.untrack(ComponentKind::Text));
        assert!(!net.untrack(ComponentKind::Text));
        assert_eq!(net.kinds().count(), 1);
    }
}
