//! Process-local connection and room bookkeeping.
//!
//! [`RoomRoster`] owns three maps — connection → info, user → current
//! connection, session → room membership — plus the volatile hand-raise
//! flags. It is plain synchronous state: the coordinator wraps it in one
//! mutex and never holds that lock across I/O.
//!
//! Hand-raise flags are deliberately not persisted; a process restart
//! clears them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use seminar_protocol::{ServerEvent, SessionId, UserId};
use seminar_transport::ConnectionId;

/// Outbound channel for one live connection. Unbounded: broadcasts must
/// never block the coordinator; a dead receiver just drops sends.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// What the roster knows about one live connection.
#[derive(Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub joined_at: DateTime<Utc>,
    pub sender: EventSender,
}

/// In-memory room/connection/hand-raise state for this process.
#[derive(Default)]
pub struct RoomRoster {
    connections: HashMap<ConnectionId, ConnectionInfo>,
    /// The connection currently considered authoritative for each user.
    users: HashMap<UserId, ConnectionId>,
    rooms: HashMap<SessionId, HashSet<ConnectionId>>,
    raised_hands: HashMap<SessionId, HashSet<UserId>>,
}

impl RoomRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection as the user's authoritative one and adds it
    /// to the session's room. Returns the user's previous connection (if
    /// any) so the caller can run the supersession steps; the previous
    /// connection stays attached until [`Self::detach_connection`].
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        session_id: SessionId,
        sender: EventSender,
        now: DateTime<Utc>,
    ) -> Option<ConnectionInfo> {
        let prior = self
            .users
            .insert(user_id.clone(), connection_id)
            .filter(|old| *old != connection_id)
            .and_then(|old| self.connections.get(&old).cloned());

        self.connections.insert(
            connection_id,
            ConnectionInfo {
                connection_id,
                user_id,
                session_id,
                joined_at: now,
                sender,
            },
        );
        self.rooms.entry(session_id).or_default().insert(connection_id);
        prior
    }

    /// Removes a connection from every map it appears in.
    ///
    /// The user → connection entry is only removed when it still points at
    /// this connection: a stale connection's late disconnect must not
    /// detach the replacement that superseded it.
    pub fn detach_connection(&mut self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let info = self.connections.remove(&connection_id)?;

        if let Some(room) = self.rooms.get_mut(&info.session_id) {
            room.remove(&connection_id);
            if room.is_empty() {
                self.rooms.remove(&info.session_id);
            }
        }
        if self.users.get(&info.user_id) == Some(&connection_id) {
            self.users.remove(&info.user_id);
        }
        Some(info)
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<&ConnectionInfo> {
        self.connections.get(&connection_id)
    }

    /// The user's authoritative connection, if they have one.
    pub fn user_connection(&self, user_id: &UserId) -> Option<&ConnectionInfo> {
        self.users
            .get(user_id)
            .and_then(|id| self.connections.get(id))
    }

    /// `true` when the user's authoritative connection is in this session.
    pub fn user_in_room(&self, session_id: &SessionId, user_id: &UserId) -> bool {
        self.user_connection(user_id)
            .is_some_and(|info| info.session_id == *session_id)
    }

    /// Cloned senders for every connection in the room.
    pub fn room_senders(&self, session_id: &SessionId) -> Vec<EventSender> {
        self.room_members(session_id)
            .map(|info| info.sender.clone())
            .collect()
    }

    /// Cloned senders for everyone in the room except `excluded`.
    pub fn room_senders_except(
        &self,
        session_id: &SessionId,
        excluded: &UserId,
    ) -> Vec<EventSender> {
        self.room_members(session_id)
            .filter(|info| info.user_id != *excluded)
            .map(|info| info.sender.clone())
            .collect()
    }

    pub fn room_connection_count(&self, session_id: &SessionId) -> usize {
        self.rooms.get(session_id).map_or(0, HashSet::len)
    }

    fn room_members(&self, session_id: &SessionId) -> impl Iterator<Item = &ConnectionInfo> {
        self.rooms
            .get(session_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
    }

    // -- hand raising -----------------------------------------------------

    pub fn set_hand(&mut self, session_id: SessionId, user_id: UserId, raised: bool) {
        let hands = self.raised_hands.entry(session_id).or_default();
        if raised {
            hands.insert(user_id);
        } else {
            hands.remove(&user_id);
            if hands.is_empty() {
                self.raised_hands.remove(&session_id);
            }
        }
    }

    pub fn hand_raised(&self, session_id: &SessionId, user_id: &UserId) -> bool {
        self.raised_hands
            .get(session_id)
            .is_some_and(|hands| hands.contains(user_id))
    }

    pub fn clear_hand(&mut self, session_id: &SessionId, user_id: &UserId) {
        if let Some(hands) = self.raised_hands.get_mut(session_id) {
            hands.remove(user_id);
            if hands.is_empty() {
                self.raised_hands.remove(session_id);
            }
        }
    }

    // -- room teardown ----------------------------------------------------

    /// Discards all bookkeeping for a session and returns the connections
    /// that were in its room. Callers send their goodbyes *before* this.
    pub fn drop_room(&mut self, session_id: &SessionId) -> Vec<ConnectionInfo> {
        self.raised_hands.remove(session_id);
        let members = self.rooms.remove(session_id).unwrap_or_default();

        let mut dropped = Vec::with_capacity(members.len());
        for connection_id in members {
            if let Some(info) = self.connections.remove(&connection_id) {
                if self.users.get(&info.user_id) == Some(&connection_id) {
                    self.users.remove(&info.user_id);
                }
                dropped.push(info);
            }
        }
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.rooms.is_empty() && self.users.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
