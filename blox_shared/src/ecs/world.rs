//! Entity registry.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Component, ComponentData, ComponentKind, ComponentType, EntityId, NetworkComponent};
use crate::{
    error::EcsError,
    event::{Event, EventQueue},
};

/// An id plus at most one component per kind.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    components: BTreeMap<ComponentKind, Component>,
    network: Option<NetworkComponent>,
}

impl Entity {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            components: BTreeMap::new(),
            network: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }

    pub fn get<T: ComponentType>(&self) -> Option<&T> {
        self.components.get(&T::KIND).and_then(|c| c.get::<T>())
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        self.components.contains_key(&kind)
    }

    /// Attached components in kind order.
    pub fn components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.values()
    }

    pub fn network(&self) -> Option<&NetworkComponent> {
        self.network.as_ref()
    }

    /// Components currently tracked by the network envelope.
    pub fn tracked_components(&self) -> impl Iterator<Item = &Component> + '_ {
        let net = self.network;
        self.components
            .values()
            .filter(move |c| net.is_some_and(|n| n.is_tracked(c.kind())))
    }
}

/// Live entity set.
///
/// Iteration is ordered by id so every system sees entities in the same
/// order on every tick.
#[derive(Debug)]
pub struct World {
    next_id: u64,
    entities: BTreeMap<EntityId, Entity>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            next_id: 1,
            entities: BTreeMap::new(),
        }
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, Entity::new(id));
        id
    }

    /// Creates a new entity that is mirrored to clients.
    pub fn spawn_networked(&mut self) -> EntityId {
        let id = self.spawn();
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.network = Some(NetworkComponent::new());
        }
        id
    }

    /// Inserts an entity with an id chosen elsewhere (client mirrors).
    /// Returns false if the id is already live.
    pub fn insert_entity(&mut self, id: EntityId) -> bool {
        if self.entities.contains_key(&id) {
            return false;
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.entities.insert(id, Entity::new(id));
        true
    }

    /// Attaches a network envelope and registers every replicated component
    /// already present. No-op if the entity is already networked.
    pub fn enable_network(&mut self, id: EntityId) -> Result<(), EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        if entity.network.is_none() {
            let mut net = NetworkComponent::new();
            for kind in entity.components.keys() {
                net.track(*kind);
            }
            entity.network = Some(net);
        }
        Ok(())
    }

    /// Removes the entity, detaching every component first so each removal
    /// is published.
    pub fn despawn(&mut self, events: &mut EventQueue, id: EntityId) -> Result<(), EcsError> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        for (kind, component) in entity.components {
            let replicated = entity.network.is_some_and(|n| n.is_tracked(kind));
            events.publish(Event::removed(component).with_replicated(replicated));
        }
        debug!(entity = ?id, "Entity despawned");
        Ok(())
    }

    /// Attaches `data` to the entity.
    ///
    /// Attaching a kind that is already present replaces the old instance;
    /// the replaced instance is published as removed before the new one is
    /// published as added.
    pub fn add_component(
        &mut self,
        events: &mut EventQueue,
        id: EntityId,
        data: impl Into<ComponentData>,
    ) -> Result<(), EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        let component = Component::new(id, data);
        let kind = component.kind();

        if let Some(net) = entity.network.as_mut() {
            net.track(kind);
        }
        let added = component.clone();
        if let Some(replaced) = entity.components.insert(kind, component) {
            events.publish(Event::removed(replaced));
        }
        events.publish(Event::added(added));
        Ok(())
    }

    /// Detaches the component of `kind`, returning it.
    ///
    /// Publishes exactly one removal event wrapping the detached instance and
    /// deregisters the kind from the network envelope. `Ok(None)` if the
    /// entity exists but has no such component.
    pub fn remove_component(
        &mut self,
        events: &mut EventQueue,
        id: EntityId,
        kind: ComponentKind,
    ) -> Result<Option<Component>, EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::EntityNotFound(id))?;
        let Some(component) = entity.components.remove(&kind) else {
            return Ok(None);
        };
        let replicated = entity.network.as_mut().is_some_and(|net| net.untrack(kind));
        events.publish(Event::removed(component.clone()).with_replicated(replicated));
        Ok(Some(component))
    }

    pub fn get_component(&self, id: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.entities.get(&id).and_then(|e| e.components.get(&kind))
    }

    pub fn get_component_mut(&mut self, id: EntityId, kind: ComponentKind) -> Option<&mut Component> {
        self.entities
            .get_mut(&id)
            .and_then(|e| e.components.get_mut(&kind))
    }

    pub fn get<T: ComponentType>(&self, id: EntityId) -> Option<&T> {
        self.get_component(id, T::KIND).and_then(|c| c.get::<T>())
    }

    /// Mutable typed access without marking the component dirty.
    pub fn get_mut<T: ComponentType>(&mut self, id: EntityId) -> Option<&mut T> {
        self.get_component_mut(id, T::KIND)
            .and_then(|c| c.get_mut::<T>())
    }

    /// Applies `f` to the component and marks it dirty.
    pub fn modify<T: ComponentType, R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let component = self.get_component_mut(id, T::KIND)?;
        let out = f(component.get_mut::<T>()?);
        component.mark_dirty();
        Some(out)
    }

    pub fn mark_dirty(&mut self, id: EntityId, kind: ComponentKind) -> bool {
        match self.get_component_mut(id, kind) {
            Some(c) => {
                c.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get_entity_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_all_entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Ids of entities carrying a `T`, collected so callers may mutate the
    /// world while walking them.
    pub fn with<T: ComponentType>(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.has(T::KIND))
            .map(|e| e.id)
            .collect()
    }

    /// Iterates entities with a given component.
    pub fn iter<T: ComponentType>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.entities
            .values()
            .filter_map(|e| e.get::<T>().map(|c| (e.id, c)))
    }

    pub fn networked_entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values().filter(|e| e.network.is_some())
    }

    /// Clears the dirty flag of every tracked component. Called once after a
    /// broadcast pass.
    pub fn clear_dirty_flags(&mut self) {
        for entity in self.entities.values_mut() {
            let Some(net) = entity.network else {
                continue;
            };
            for component in entity.components.values_mut() {
                if net.is_tracked(component.kind()) {
                    component.clear_dirty();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
