//! Inbound message dispatch.
//!
//! Raw frames are decoded into an [`Envelope`] and routed by message type to
//! the handler registered for it. Handlers never touch the physics world;
//! they only queue work on components for the next tick.

use blox_shared::{
    ecs::{ChatEntry, ChatList, ComponentKind, EntityId, InputQueue},
    error::{EcsError, ProtocolError},
    protocol::{ChatMessage, ClientMessageType, Envelope, InputMessage},
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::simulation::Simulation;

/// Oldest chat lines are dropped past this.
pub const MAX_CHAT_MESSAGES: usize = 50;

/// Longest chat line kept, in characters.
pub const MAX_CHAT_LEN: usize = 256;

/// Inputs buffered per player between ticks.
pub const MAX_PENDING_INPUTS: usize = 16;

pub type Handler = fn(&mut Simulation, EntityId, &Envelope) -> Result<(), ProtocolError>;

/// Routes decoded envelopes to per-type handlers.
pub struct Dispatcher {
    handlers: HashMap<ClientMessageType, Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        let mut d = Self::empty();
        d.register(ClientMessageType::Input, handle_input);
        d.register(ClientMessageType::ChatMessage, handle_chat);
        d
    }
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, t: ClientMessageType, handler: Handler) {
        self.handlers.insert(t, handler);
    }

    /// Decodes `bytes` and runs the matching handler for `sender`.
    ///
    /// Callers drop the message on any error; the sender is never told.
    pub fn dispatch(
        &self,
        sim: &mut Simulation,
        sender: EntityId,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        let env = Envelope::decode(bytes)?;
        let t = ClientMessageType::try_from(env.t)?;
        match self.handlers.get(&t) {
            Some(handler) => handler(sim, sender, &env),
            None => {
                debug!(?t, "No handler registered");
                Ok(())
            }
        }
    }
}

fn handle_input(sim: &mut Simulation, sender: EntityId, env: &Envelope) -> Result<(), ProtocolError> {
    let input: InputMessage = env.body()?;
    let queue = sim
        .world
        .get_mut::<InputQueue>(sender)
        .ok_or(EcsError::ComponentNotFound {
            entity: sender,
            kind: ComponentKind::InputQueue,
        })?;
    if queue.pending.len() >= MAX_PENDING_INPUTS {
        queue.pending.remove(0);
    }
    queue.pending.push(input);
    Ok(())
}

fn handle_chat(sim: &mut Simulation, sender: EntityId, env: &Envelope) -> Result<(), ProtocolError> {
    let msg: ChatMessage = env.body()?;
    let content: String = msg.content.trim().chars().take(MAX_CHAT_LEN).collect();
    if content.is_empty() {
        return Ok(());
    }

    let Some(chat) = sim.world.with::<ChatList>().first().copied() else {
        warn!("No chat entity, dropping message");
        return Ok(());
    };
    let entry = ChatEntry {
        author: sender,
        content,
        timestamp: Utc::now(),
    };
    sim.world.modify::<ChatList, _>(chat, |list| {
        list.messages.push(entry);
        let excess = list.messages.len().saturating_sub(MAX_CHAT_MESSAGES);
        list.messages.drain(..excess);
    });
    Ok(())
}
