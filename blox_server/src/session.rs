//! Connection to player bookkeeping.

use blox_shared::{ecs::EntityId, protocol::ClientId};
use std::collections::BTreeMap;

use crate::transport::ConnectionHandle;

/// One connected client and the player entity it controls.
#[derive(Debug)]
pub struct Session {
    pub conn: ConnectionHandle,
    pub entity: EntityId,
    /// Set on connect, cleared after the first delta reaches the client.
    pub fresh: bool,
    /// Whether the last send left the connection over its watermark.
    pub congested: bool,
}

impl Session {
    pub fn new(conn: ConnectionHandle, entity: EntityId) -> Self {
        Self {
            conn,
            entity,
            fresh: true,
            congested: false,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.conn.client_id()
    }
}

/// Live sessions keyed by connection.
#[derive(Debug, Default)]
pub struct Sessions {
    by_client: BTreeMap<ClientId, Session>,
}

impl Sessions {
    pub fn insert(&mut self, session: Session) {
        self.by_client.insert(session.client_id(), session);
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<Session> {
        self.by_client.remove(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Session> {
        self.by_client.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Session> {
        self.by_client.get_mut(&client_id)
    }

    pub fn entity_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.by_client.get(&client_id).map(|s| s.entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> + '_ {
        self.by_client.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> + '_ {
        self.by_client.values_mut()
    }

    pub fn len(&self) -> usize {
        self.by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }
}
