//! In-process transport.
//!
//! [`LoopbackNetwork`] links one server peer with any number of client peers
//! through unbounded channels. Delivery is immediate and ordered; with
//! [`LoopbackConfig::drop_unreliable_every`] set, every n-th unreliable frame
//! is silently discarded to exercise lossy-link behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, trace};

use crate::channel::ConnectionId;
use crate::messages::DeliveryMethod;
use crate::peer::{ConnectionStatus, NetPeer, PeerEvent, PeerLogLevel};

/// Behaviour of a [`LoopbackNetwork`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// Drop every n-th unreliable frame; `0` never drops.
    pub drop_unreliable_every: u64,
}

impl LoopbackConfig {
    /// A link that drops every `n`-th unreliable frame.
    #[must_use]
    pub fn lossy(n: u64) -> Self {
        Self {
            drop_unreliable_every: n,
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: LoopbackConfig,
    server_tx: UnboundedSender<PeerEvent>,
    clients: DashMap<ConnectionId, UnboundedSender<PeerEvent>>,
    next_conn: AtomicU64,
    unreliable_sent: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn should_drop(&self, method: DeliveryMethod) -> bool {
        if method != DeliveryMethod::Unreliable || self.config.drop_unreliable_every == 0 {
            return false;
        }
        let n = self.unreliable_sent.fetch_add(1, Ordering::Relaxed) + 1;
        let drop = n % self.config.drop_unreliable_every == 0;
        if drop {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        drop
    }

    fn to_server(&self, event: PeerEvent) {
        // Sending fails only once the server peer is gone.
        let _ = self.server_tx.send(event);
    }

    fn to_client(&self, conn: ConnectionId, event: PeerEvent) -> bool {
        self.clients
            .get(&conn)
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

/// Factory for connected loopback peers.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    shared: Arc<Shared>,
}

impl LoopbackNetwork {
    /// Create a network and its server peer.
    #[must_use]
    pub fn new(config: LoopbackConfig) -> (Self, LoopbackServerPeer) {
        let (server_tx, server_rx) = unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            server_tx,
            clients: DashMap::new(),
            next_conn: AtomicU64::new(1),
            unreliable_sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let server = LoopbackServerPeer {
            shared: Arc::clone(&shared),
            rx: server_rx,
        };
        (Self { shared }, server)
    }

    /// Create a new, unconnected client peer.
    #[must_use]
    pub fn client(&self) -> LoopbackClientPeer {
        let (tx, rx) = unbounded_channel();
        LoopbackClientPeer {
            shared: Arc::clone(&self.shared),
            tx,
            rx,
            conn: None,
        }
    }

    /// Number of unreliable frames dropped so far.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

fn drain(rx: &mut UnboundedReceiver<PeerEvent>) -> Vec<PeerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn status(conn: ConnectionId, status: ConnectionStatus, remote_id: u64, reason: &str) -> PeerEvent {
    PeerEvent::StatusChanged {
        conn,
        status,
        remote_id,
        reason: reason.to_string(),
        hail: None,
    }
}

/// The server end of a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackServerPeer {
    shared: Arc<Shared>,
    rx: UnboundedReceiver<PeerEvent>,
}

impl NetPeer for LoopbackServerPeer {
    fn poll(&mut self) -> Vec<PeerEvent> {
        drain(&mut self.rx)
    }

    fn send(&mut self, conn: ConnectionId, payload: Vec<u8>, method: DeliveryMethod) {
        if self.shared.should_drop(method) {
            trace!(%conn, "loopback dropped unreliable frame");
            return;
        }
        if !self.shared.to_client(conn, PeerEvent::Data { conn, payload }) {
            trace!(%conn, "loopback send to unknown connection");
        }
    }

    fn connect(&mut self, _hail: Vec<u8>) {
        self.shared.to_server(PeerEvent::Log {
            level: PeerLogLevel::Warning,
            message: "connect called on a server peer".to_string(),
        });
    }

    fn approve(&mut self, conn: ConnectionId, hail: Vec<u8>) {
        let event = PeerEvent::StatusChanged {
            conn,
            status: ConnectionStatus::Connected,
            remote_id: conn.0,
            reason: String::new(),
            hail: Some(hail),
        };
        if self.shared.to_client(conn, event) {
            self.shared
                .to_server(status(conn, ConnectionStatus::Connected, conn.0, ""));
        } else {
            debug!(%conn, "client vanished before approval");
        }
    }

    fn deny(&mut self, conn: ConnectionId, reason: &str) {
        self.shared
            .to_client(conn, status(conn, ConnectionStatus::Disconnected, 0, reason));
        self.shared.clients.remove(&conn);
    }

    fn disconnect(&mut self, conn: ConnectionId, reason: &str) {
        if self.shared.clients.remove(&conn).is_some_and(|(_, tx)| {
            tx.send(status(conn, ConnectionStatus::Disconnected, conn.0, reason))
                .is_ok()
        }) {
            debug!(%conn, reason, "loopback disconnected client");
        }
        self.shared
            .to_server(status(conn, ConnectionStatus::Disconnected, conn.0, reason));
    }

    fn shutdown(&mut self, reason: &str) {
        let conns: Vec<ConnectionId> = self.shared.clients.iter().map(|e| *e.key()).collect();
        for conn in conns {
            self.disconnect(conn, reason);
        }
    }
}

/// A client end of a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackClientPeer {
    shared: Arc<Shared>,
    tx: UnboundedSender<PeerEvent>,
    rx: UnboundedReceiver<PeerEvent>,
    conn: Option<ConnectionId>,
}

impl LoopbackClientPeer {
    /// The connection id assigned by the last `connect`.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionId> {
        self.conn
    }
}

impl NetPeer for LoopbackClientPeer {
    fn poll(&mut self) -> Vec<PeerEvent> {
        drain(&mut self.rx)
    }

    fn send(&mut self, conn: ConnectionId, payload: Vec<u8>, method: DeliveryMethod) {
        if self.conn != Some(conn) || !self.shared.clients.contains_key(&conn) {
            trace!(%conn, "loopback send on closed connection");
            return;
        }
        if self.shared.should_drop(method) {
            trace!(%conn, "loopback dropped unreliable frame");
            return;
        }
        self.shared.to_server(PeerEvent::Data { conn, payload });
    }

    fn connect(&mut self, hail: Vec<u8>) {
        let conn = ConnectionId(self.shared.next_conn.fetch_add(1, Ordering::Relaxed));
        self.conn = Some(conn);
        self.shared.clients.insert(conn, self.tx.clone());
        if self.shared.server_tx.send(PeerEvent::ApprovalRequest { conn, hail }).is_err() {
            self.shared.clients.remove(&conn);
            let _ = self
                .tx
                .send(status(conn, ConnectionStatus::Disconnected, 0, "server unreachable"));
        }
    }

    fn approve(&mut self, _conn: ConnectionId, _hail: Vec<u8>) {}

    fn deny(&mut self, _conn: ConnectionId, _reason: &str) {}

    fn disconnect(&mut self, conn: ConnectionId, reason: &str) {
        if self.shared.clients.remove(&conn).is_some() {
            self.shared
                .to_server(status(conn, ConnectionStatus::Disconnected, conn.0, reason));
            let _ = self
                .tx
                .send(status(conn, ConnectionStatus::Disconnected, conn.0, reason));
        }
        self.conn = None;
    }

    fn shutdown(&mut self, reason: &str) {
        if let Some(conn) = self.conn {
            self.disconnect(conn, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_pair(config: LoopbackConfig) -> (LoopbackNetwork, LoopbackServerPeer, LoopbackClientPeer, ConnectionId) {
        let (net, mut server) = LoopbackNetwork::new(config);
        let mut client = net.client();
        client.connect(b"hi".to_vec());
        let events = server.poll();
        let PeerEvent::ApprovalRequest { conn, hail } = &events[0] else {
            panic!("expected approval request, got {events:?}");
        };
        assert_eq!(hail, b"hi");
        let conn = *conn;
        server.approve(conn, b"ok".to_vec());
        (net, server, client, conn)
    }

    #[test]
    fn test_approval_connects_both_sides() {
        let (_net, mut server, mut client, conn) = connected_pair(LoopbackConfig::default());
        let client_events = client.poll();
        assert!(matches!(
            &client_events[0],
            PeerEvent::StatusChanged { status: ConnectionStatus::Connected, hail: Some(h), .. } if h == b"ok"
        ));
        let server_events = server.poll();
        assert!(matches!(
            &server_events[0],
            PeerEvent::StatusChanged { conn: c, status: ConnectionStatus::Connected, .. } if *c == conn
        ));
    }

    #[test]
    fn test_data_flows_both_ways() {
        let (_net, mut server, mut client, conn) = connected_pair(LoopbackConfig::default());
        client.poll();
        server.poll();

        client.send(conn, vec![1, 2], DeliveryMethod::ReliableUnordered);
        server.send(conn, vec![3], DeliveryMethod::Unreliable);

        assert_eq!(server.poll(), vec![PeerEvent::Data { conn, payload: vec![1, 2] }]);
        assert_eq!(client.poll(), vec![PeerEvent::Data { conn, payload: vec![3] }]);
    }

    #[test]
    fn test_deny_reports_zero_remote_id() {
        let (net, mut server) = LoopbackNetwork::new(LoopbackConfig::default());
        let mut client = net.client();
        client.connect(Vec::new());
        let conn = client.connection().unwrap();
        server.poll();
        server.deny(conn, "Server is full.");

        let events = client.poll();
        assert!(matches!(
            &events[0],
            PeerEvent::StatusChanged { status: ConnectionStatus::Disconnected, remote_id: 0, reason, .. }
                if reason == "Server is full."
        ));
    }

    #[test]
    fn test_lossy_link_drops_only_unreliable() {
        let (net, mut server, mut client, conn) = connected_pair(LoopbackConfig::lossy(2));
        client.poll();
        for i in 0..4u8 {
            server.send(conn, vec![i], DeliveryMethod::Unreliable);
        }
        server.send(conn, vec![9], DeliveryMethod::ReliableUnordered);

        let received: Vec<_> = client.poll();
        assert_eq!(received.len(), 3);
        assert_eq!(net.dropped_frames(), 2);
    }

    #[test]
    fn test_client_disconnect_notifies_server() {
        let (_net, mut server, mut client, conn) = connected_pair(LoopbackConfig::default());
        server.poll();
        client.disconnect(conn, "bye");

        let events = server.poll();
        assert!(matches!(
            &events[0],
            PeerEvent::StatusChanged { status: ConnectionStatus::Disconnected, remote_id, reason, .. }
                if *remote_id == conn.0 && reason == "bye"
        ));
    }
}
