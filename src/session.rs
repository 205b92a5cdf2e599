//! Session management: the actor resolution service consulted once per
//! client command, plus the outbound notice channel each actor carries.
//!
//! The registry is read-mostly; the network edge inserts and the control
//! consumer removes. Consumers never write to sockets directly: they push
//! outbound messages onto the actor's channel and the network writer drains
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam_channel::{Receiver, Sender};

use crate::data::MapId;
use crate::world::guard::ConditionFlags;

pub type ConnectionId = u64;

/// Messages pushed to an actor for delivery by the network writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    SystemMessage(String),
    /// Forced client resync.
    Refresh,
    CloseDialog,
}

/// A connected player session as seen by the dispatcher.
pub struct Actor {
    pub connection_id: ConnectionId,
    pub name: String,
    condition: AtomicU32,
    map_id: AtomicU16,
    x: AtomicU16,
    y: AtomicU16,
    outbound: Sender<OutboundMessage>,
}

impl Actor {
    pub fn condition(&self) -> ConditionFlags {
        ConditionFlags::from_bits(self.condition.load(Ordering::Relaxed))
    }

    pub fn set_condition(&self, flags: ConditionFlags) {
        self.condition.store(flags.bits(), Ordering::Relaxed);
    }

    pub fn add_condition(&self, flags: ConditionFlags) {
        self.condition.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    pub fn remove_condition(&self, flags: ConditionFlags) {
        self.condition.fetch_and(!flags.bits(), Ordering::Relaxed);
    }

    pub fn map_id(&self) -> MapId {
        self.map_id.load(Ordering::Relaxed)
    }

    pub fn set_map_id(&self, map_id: MapId) {
        self.map_id.store(map_id, Ordering::Relaxed);
    }

    pub fn position(&self) -> (u16, u16) {
        (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed))
    }

    pub fn set_position(&self, x: u16, y: u16) {
        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
    }

    /// Best effort; a send to a disconnected session is silently dropped,
    /// cleanup happens via the control queue.
    pub fn send(&self, message: OutboundMessage) {
        let _ = self.outbound.send(message);
    }

    pub fn send_system_message(&self, text: impl Into<String>) {
        self.send(OutboundMessage::SystemMessage(text.into()));
    }

    pub fn refresh(&self) {
        self.send(OutboundMessage::Refresh);
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<Actor>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Returns the actor and the receiving end of
    /// its outbound channel (owned by the network writer, or by tests).
    pub fn register(
        &self,
        name: impl Into<String>,
        map_id: MapId,
    ) -> (Arc<Actor>, Receiver<OutboundMessage>) {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = crossbeam_channel::unbounded();
        let actor = Arc::new(Actor {
            connection_id,
            name: name.into(),
            condition: AtomicU32::new(ConditionFlags::ALIVE.bits()),
            map_id: AtomicU16::new(map_id),
            x: AtomicU16::new(0),
            y: AtomicU16::new(0),
            outbound: tx,
        });
        self.sessions
            .write()
            .expect("session registry lock poisoned")
            .insert(connection_id, Arc::clone(&actor));
        tracing::info!("[session] registered {} id={}", actor.name, connection_id);
        (actor, rx)
    }

    /// Resolve the owning actor for a connection id, if still connected.
    pub fn try_resolve(&self, connection_id: ConnectionId) -> Option<Arc<Actor>> {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .get(&connection_id)
            .cloned()
    }

    pub fn remove(&self, connection_id: ConnectionId) -> Option<Arc<Actor>> {
        let removed = self
            .sessions
            .write()
            .expect("session registry lock poisoned")
            .remove(&connection_id);
        if let Some(actor) = &removed {
            tracing::info!("[session] removed {} id={}", actor.name, connection_id);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .len()
    }

    /// Connected observers on a map. Maps with zero observers are skipped
    /// by the AI scheduler entirely.
    pub fn observers_on(&self, map_id: MapId) -> usize {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .values()
            .filter(|actor| actor.map_id() == map_id)
            .count()
    }

    /// Snapshot of all connected actors, for broadcasts.
    pub fn all(&self) -> Vec<Arc<Actor>> {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = SessionRegistry::new();
        let (actor, _rx) = registry.register("aislinn", 1);
        assert_eq!(registry.count(), 1);

        let resolved = registry.try_resolve(actor.connection_id).unwrap();
        assert_eq!(resolved.name, "aislinn");
        assert!(resolved.condition().contains(ConditionFlags::ALIVE));

        assert!(registry.try_resolve(9999).is_none());
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        let (actor, _rx) = registry.register("aislinn", 1);
        assert!(registry.remove(actor.connection_id).is_some());
        assert!(registry.try_resolve(actor.connection_id).is_none());
        assert!(registry.remove(actor.connection_id).is_none());
    }

    #[test]
    fn test_observer_counting() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = registry.register("a", 1);
        let (_b, _rx_b) = registry.register("b", 1);
        let (_c, _rx_c) = registry.register("c", 2);

        assert_eq!(registry.observers_on(1), 2);
        assert_eq!(registry.observers_on(2), 1);
        assert_eq!(registry.observers_on(3), 0);

        a.set_map_id(2);
        assert_eq!(registry.observers_on(1), 1);
        assert_eq!(registry.observers_on(2), 2);
    }

    #[test]
    fn test_outbound_channel() {
        let registry = SessionRegistry::new();
        let (actor, rx) = registry.register("a", 1);
        actor.send_system_message("You cannot do that now.");
        actor.refresh();

        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::SystemMessage("You cannot do that now.".to_string())
        );
        assert_eq!(rx.try_recv().unwrap(), OutboundMessage::Refresh);
    }

    #[test]
    fn test_send_after_receiver_drop_is_silent() {
        let registry = SessionRegistry::new();
        let (actor, rx) = registry.register("a", 1);
        drop(rx);
        // Must not panic or error
        actor.send_system_message("gone");
    }

    #[test]
    fn test_condition_flag_updates() {
        let registry = SessionRegistry::new();
        let (actor, _rx) = registry.register("a", 1);
        actor.add_condition(ConditionFlags::IN_DIALOG);
        assert!(actor.condition().contains(ConditionFlags::IN_DIALOG));
        assert!(actor.condition().contains(ConditionFlags::ALIVE));
        actor.remove_condition(ConditionFlags::IN_DIALOG);
        assert!(!actor.condition().intersects(ConditionFlags::IN_DIALOG));
    }
}
