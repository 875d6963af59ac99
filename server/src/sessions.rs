//! Live realtime sessions and their room memberships.
//!
//! A session exists from a successful handshake until its
//! [`SessionGuard`] is dropped. Dropping the guard releases every room
//! membership exactly once, whichever way the connection ended.
//!
//! Lock order: a session entry may be held while touching `rooms`,
//! never the other way round.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::ServerEvent;
use crate::rooms::RoomId;

pub type ConnectionId = Uuid;
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

struct SessionEntry {
    rooms: HashSet<RoomId>,
    tx: EventSender,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, SessionEntry>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind a new connection to an authenticated email. Connection ids
    /// are fresh per connection, so a reconnect never inherits rooms.
    pub fn open(self: &Arc<Self>, email: String, tx: EventSender) -> SessionGuard {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                rooms: HashSet::new(),
                tx: tx.clone(),
            },
        );
        SessionGuard {
            id,
            email,
            tx,
            registry: Arc::clone(self),
        }
    }

    /// Add a connection to a room. Returns false if it was already a
    /// member or the session is gone.
    pub fn join(&self, id: ConnectionId, room: RoomId) -> bool {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room).or_default().insert(id);
        true
    }

    /// Deliver an event to every member of `room`. Returns the number
    /// of live members it was handed to.
    pub fn broadcast(&self, room: &RoomId, event: &ServerEvent) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };
        members
            .into_iter()
            .filter(|id| {
                self.sessions
                    .get(id)
                    .is_some_and(|s| s.tx.send(event.clone()).is_ok())
            })
            .count()
    }

    pub fn members(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> HashSet<RoomId> {
        self.sessions
            .get(&id)
            .map(|s| s.rooms.clone())
            .unwrap_or_default()
    }

    fn release(&self, id: ConnectionId) {
        let Some((_, session)) = self.sessions.remove(&id) else {
            return;
        };
        for room in &session.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        debug!(conn = %id, rooms = session.rooms.len(), "session released");
    }
}

/// Scoped ownership of one live session.
pub struct SessionGuard {
    id: ConnectionId,
    email: String,
    tx: EventSender,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Authenticated email, fixed at handshake.
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn join(&self, room: RoomId) -> bool {
        self.registry.join(self.id, room)
    }

    /// Send an event to this connection only.
    pub fn emit(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorPayload;

    fn ping() -> ServerEvent {
        ServerEvent::Error(ErrorPayload {
            message: "ping".into(),
            error: None,
        })
    }

    #[test]
    fn test_join_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = registry.open("a@x.com".into(), tx);
        let room = RoomId::Order("o1".into());

        assert!(session.join(room.clone()));
        assert!(!session.join(room.clone()));
        assert_eq!(registry.members(&room), 1);

        assert_eq!(registry.broadcast(&room, &ping()), 1);
        assert_eq!(rx.try_recv().unwrap(), ping());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_releases_memberships() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.open("a@x.com".into(), tx_a);
        let b = registry.open("b@x.com".into(), tx_b);
        let chat = RoomId::chat("a@x.com", "b@x.com");
        let order = RoomId::Order("o1".into());

        a.join(chat.clone());
        a.join(order.clone());
        b.join(chat.clone());
        let a_id = a.id();
        assert_eq!(registry.rooms_of(a_id).len(), 2);

        drop(a);
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.members(&chat), 1);
        assert_eq!(registry.members(&order), 0);
        assert!(registry.rooms_of(a_id).is_empty());
        // A stale id cannot rejoin.
        assert!(!registry.join(a_id, order.clone()));

        assert_eq!(registry.broadcast(&chat, &ping()), 1);
        assert_eq!(rx_b.try_recv().unwrap(), ping());
    }

    #[test]
    fn test_reconnect_gets_fresh_session() {
        let registry = SessionRegistry::new();
        let room = RoomId::Order("o1".into());

        let (tx, _rx) = mpsc::unbounded_channel();
        let first = registry.open("a@x.com".into(), tx);
        first.join(room.clone());
        let first_id = first.id();
        drop(first);

        let (tx, _rx) = mpsc::unbounded_channel();
        let second = registry.open("a@x.com".into(), tx);
        assert_ne!(second.id(), first_id);
        assert!(registry.rooms_of(second.id()).is_empty());
        assert_eq!(registry.members(&room), 0);
    }

    #[test]
    fn test_broadcast_skips_closed_receivers() {
        let registry = SessionRegistry::new();
        let room = RoomId::Order("o1".into());
        let (tx, rx) = mpsc::unbounded_channel();
        let session = registry.open("a@x.com".into(), tx);
        session.join(room.clone());
        drop(rx);
        assert_eq!(registry.broadcast(&room, &ping()), 0);
    }
}
