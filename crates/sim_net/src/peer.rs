//! The transport seam.
//!
//! A [`NetPeer`] moves opaque frames between connections and reports what
//! happened as [`PeerEvent`]s. Peers receive on their own threads or tasks
//! and queue events; [`NetPeer::poll`] drains that queue on the simulation
//! thread and never blocks.

use crate::channel::ConnectionId;
use crate::messages::DeliveryMethod;

/// Transport-level status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The remote side accepted the connection.
    Connected,
    /// The connection is gone, or never came up.
    Disconnected,
}

/// Severity of a peer diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLogLevel {
    Debug,
    Warning,
    Error,
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A diagnostic from the transport itself.
    Log { level: PeerLogLevel, message: String },
    /// A remote client asks to connect (server side).
    ApprovalRequest { conn: ConnectionId, hail: Vec<u8> },
    /// A connection changed status.
    ///
    /// A `Disconnected` status with `remote_id == 0` means the connection
    /// never came up. `hail` carries the approval reply on the client side.
    StatusChanged {
        conn: ConnectionId,
        status: ConnectionStatus,
        remote_id: u64,
        reason: String,
        hail: Option<Vec<u8>>,
    },
    /// A frame arrived.
    Data { conn: ConnectionId, payload: Vec<u8> },
}

/// A connection-oriented transport endpoint.
pub trait NetPeer: Send {
    /// Drain every queued event without blocking.
    fn poll(&mut self) -> Vec<PeerEvent>;

    /// Send a frame. Fire-and-forget; failures surface as events.
    fn send(&mut self, conn: ConnectionId, payload: Vec<u8>, method: DeliveryMethod);

    /// Open a connection to the server, carrying `hail` (client side).
    fn connect(&mut self, hail: Vec<u8>);

    /// Accept a pending connection, replying with `hail` (server side).
    fn approve(&mut self, conn: ConnectionId, hail: Vec<u8>);

    /// Refuse a pending connection (server side).
    fn deny(&mut self, conn: ConnectionId, reason: &str);

    /// Close a connection.
    fn disconnect(&mut self, conn: ConnectionId, reason: &str);

    /// Close every connection and stop receiving.
    fn shutdown(&mut self, reason: &str);
}
