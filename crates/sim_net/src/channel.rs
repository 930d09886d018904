//! Connections, sessions and per-channel traffic statistics.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Peer-level handle of one remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Identity of one login; stable for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId {
    /// The unique user name assigned by the server.
    pub username: String,
}

impl SessionId {
    /// Create a session id.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}

/// Lifecycle of a channel.
///
/// ```text
/// Connecting → Approval → Connected → Usable → Disconnected
/// ```
///
/// A channel only carries application messages once `Usable`, i.e. after the
/// string table has been exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport handshake in progress.
    Connecting,
    /// Waiting for the server to approve the login.
    Approval,
    /// Transport established, string table not yet exchanged.
    Connected,
    /// Ready for application traffic.
    Usable,
    /// Closed.
    Disconnected,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Total sent bytes.
    pub sent_bytes: u64,
    /// Total received bytes.
    pub received_bytes: u64,
    /// Total sent packets.
    pub sent_packets: u64,
    /// Total received packets.
    pub received_packets: u64,
}

impl NetworkStats {
    /// Count one sent packet.
    pub fn record_sent(&mut self, bytes: usize) {
        self.sent_packets += 1;
        self.sent_bytes += bytes as u64;
    }

    /// Count one received packet.
    pub fn record_received(&mut self, bytes: usize) {
        self.received_packets += 1;
        self.received_bytes += bytes as u64;
    }
}

impl AddAssign for NetworkStats {
    fn add_assign(&mut self, rhs: Self) {
        self.sent_bytes += rhs.sent_bytes;
        self.received_bytes += rhs.received_bytes;
        self.sent_packets += rhs.sent_packets;
        self.received_packets += rhs.received_packets;
    }
}

/// One logical connection to a remote peer.
#[derive(Debug, Clone)]
pub struct NetChannel {
    connection: ConnectionId,
    session: SessionId,
    state: ConnectionState,
    stats: NetworkStats,
}

impl NetChannel {
    /// Create a channel for a freshly connected peer.
    #[must_use]
    pub fn new(connection: ConnectionId, session: SessionId) -> Self {
        Self {
            connection,
            session,
            state: ConnectionState::Connected,
            stats: NetworkStats::default(),
        }
    }

    /// The peer-level connection handle.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// The session of this login.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to a new lifecycle state.
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Whether application messages may flow.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state == ConnectionState::Usable
    }

    /// Traffic counters of this channel.
    #[must_use]
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Mutable traffic counters.
    pub fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_channel_is_connected_not_usable() {
        let channel = NetChannel::new(ConnectionId(1), SessionId::new("bob"));
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert!(!channel.is_usable());
        assert_eq!(channel.session().to_string(), "bob");
    }

    #[test]
    fn test_stats_accumulate() {
        let mut a = NetworkStats::default();
        a.record_sent(10);
        a.record_received(4);
        let mut total = NetworkStats::default();
        total += a;
        total += a;
        assert_eq!(total.sent_bytes, 20);
        assert_eq!(total.received_packets, 2);
    }
}
