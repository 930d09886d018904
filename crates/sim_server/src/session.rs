//! Player sessions.
//!
//! The server keeps one [`PlayerSession`] per connected channel. Besides
//! identity and status, a session holds the replication cursor: the last
//! tick the client acknowledged. Game states for that client are built from
//! the cursor, and the smallest cursor bounds how much deletion history the
//! server must keep.

use std::time::Instant;

use dashmap::DashMap;
use sim_component::Tick;
use sim_net::{ConnectionId, SessionId};
use tracing::{debug, info};

/// Lifecycle of a player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Channel usable, not yet receiving game states.
    Connected,
    /// Receiving game states.
    InGame,
}

/// One connected player.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub conn: ConnectionId,
    pub session: SessionId,
    pub status: SessionStatus,
    /// Last acknowledged tick; 0 until the first ack.
    pub last_acked_tick: Tick,
    pub connected_at: Instant,
}

/// Registry of every session, keyed by connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, PlayerSession>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add a session for a newly usable channel.
    pub fn connect(&self, conn: ConnectionId, session: SessionId) {
        info!(%conn, %session, "player connected");
        self.sessions.insert(
            conn,
            PlayerSession {
                conn,
                session,
                status: SessionStatus::Connected,
                last_acked_tick: 0,
                connected_at: Instant::now(),
            },
        );
    }

    /// Start sending game states to `conn`. Returns `false` if unknown.
    pub fn join_game(&self, conn: ConnectionId) -> bool {
        let Some(mut entry) = self.sessions.get_mut(&conn) else {
            return false;
        };
        entry.status = SessionStatus::InGame;
        debug!(%conn, session = %entry.session, "player joined game");
        true
    }

    /// Remove the session of `conn`.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<PlayerSession> {
        let (_, session) = self.sessions.remove(&conn)?;
        info!(%conn, session = %session.session, "player disconnected");
        Some(session)
    }

    /// Move the cursor of `conn` forward to `tick`. Older acks, which can
    /// arrive out of order, are ignored. Returns `true` if the cursor moved.
    pub fn acknowledge(&self, conn: ConnectionId, tick: Tick) -> bool {
        let Some(mut entry) = self.sessions.get_mut(&conn) else {
            return false;
        };
        if tick <= entry.last_acked_tick {
            return false;
        }
        entry.last_acked_tick = tick;
        true
    }

    #[must_use]
    pub fn get(&self, conn: ConnectionId) -> Option<PlayerSession> {
        self.sessions.get(&conn).map(|entry| entry.clone())
    }

    /// `(connection, cursor)` of every in-game session, ordered by
    /// connection.
    #[must_use]
    pub fn in_game(&self) -> Vec<(ConnectionId, Tick)> {
        let mut cursors: Vec<(ConnectionId, Tick)> = self
            .sessions
            .iter()
            .filter(|entry| entry.status == SessionStatus::InGame)
            .map(|entry| (entry.conn, entry.last_acked_tick))
            .collect();
        cursors.sort_unstable();
        cursors
    }

    /// Smallest cursor over all sessions, connected or in game.
    #[must_use]
    pub fn min_cursor(&self) -> Option<Tick> {
        self.sessions.iter().map(|entry| entry.last_acked_tick).min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        let registry = SessionRegistry::new();
        registry.connect(ConnectionId(1), SessionId::new("alice"));
        registry.connect(ConnectionId(2), SessionId::new("bob"));
        registry
    }

    #[test]
    fn test_connect_and_join() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.in_game().is_empty());
        assert!(registry.join_game(ConnectionId(2)));
        assert!(!registry.join_game(ConnectionId(9)));
        assert_eq!(registry.in_game(), vec![(ConnectionId(2), 0)]);
        assert_eq!(registry.get(ConnectionId(2)).unwrap().status, SessionStatus::InGame);
    }

    #[test]
    fn test_acknowledge_is_monotonic() {
        let registry = registry();
        assert!(registry.acknowledge(ConnectionId(1), 5));
        assert!(!registry.acknowledge(ConnectionId(1), 3));
        assert!(!registry.acknowledge(ConnectionId(1), 5));
        assert_eq!(registry.get(ConnectionId(1)).unwrap().last_acked_tick, 5);
        assert!(!registry.acknowledge(ConnectionId(7), 1));
    }

    #[test]
    fn test_min_cursor() {
        let registry = registry();
        registry.acknowledge(ConnectionId(1), 8);
        registry.acknowledge(ConnectionId(2), 4);
        assert_eq!(registry.min_cursor(), Some(4));
        registry.disconnect(ConnectionId(2));
        assert_eq!(registry.min_cursor(), Some(8));
        registry.disconnect(ConnectionId(1));
        assert_eq!(registry.min_cursor(), None);
        assert!(registry.is_empty());
    }
}
