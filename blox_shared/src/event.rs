//! Tick-scoped event queue.
//!
//! The registry publishes "component added" / "component removed" events
//! while systems run. Systems scheduled later in the same tick query them by
//! event kind and component kind. The scheduler flushes the queue once, after
//! replication, so no event survives into the next tick.

use crate::ecs::{Component, ComponentKind, ComponentType, EntityId};

/// What happened to the wrapped component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ComponentAdded,
    ComponentRemoved,
}

/// Immutable record of a component change during the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    component: Component,
    replicated: bool,
}

impl Event {
    pub fn added(component: Component) -> Self {
        Self {
            kind: EventKind::ComponentAdded,
            component,
            replicated: false,
        }
    }

    pub fn removed(component: Component) -> Self {
        Self {
            kind: EventKind::ComponentRemoved,
            component,
            replicated: false,
        }
    }

    /// Marks the change as one clients were told about, so a removal must
    /// reach them too.
    pub fn with_replicated(mut self, replicated: bool) -> Self {
        self.replicated = replicated;
        self
    }

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn entity_id(&self) -> EntityId {
        self.component.entity_id()
    }
}

/// Event queue owned by the tick scheduler.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Queued events of `kind` wrapping a `component_kind`, in publish order.
    pub fn query(
        &self,
        kind: EventKind,
        component_kind: ComponentKind,
    ) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter(move |e| e.kind == kind && e.component.kind() == component_kind)
    }

    /// Typed variant of [`EventQueue::query`] yielding `(entity, record)`.
    pub fn query_typed<T: ComponentType>(
        &self,
        kind: EventKind,
    ) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.query(kind, T::KIND)
            .filter_map(|e| e.component.get::<T>().map(|c| (e.entity_id(), c)))
    }

    /// All queued events in publish order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every queued event. Called once per tick, last.
    pub fn flush(&mut self) {
        self.events.clear();
    }
}
