//! NATS-backed transport.
//!
//! [`NatsPeer`] implements [`NetPeer`] on top of core NATS subjects (see
//! [`subjects`](crate::subjects)). Receive loops run as tokio tasks and
//! forward [`PeerEvent`]s into an unbounded channel that
//! [`NetPeer::poll`] drains. Sends are spawned and never awaited by the
//! caller.
//!
//! Core NATS delivers at most once and in order per subject, so every
//! delivery method maps onto the same publish. Reliable groups (core,
//! string and command) get no acknowledgement or resend on this transport:
//! a frame the server drops is gone. Losing a [`MsgStringTable`] leaves
//! the client channel unusable, so every later message on it is dropped
//! and the client has to disconnect and log in again to get a fresh table. Entity states
//! recover on their own because the next delta is built from the last
//! acknowledged tick.
//!
//! [`MsgStringTable`]: crate::messages::MsgStringTable

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::ConnectionId;
use crate::codec;
use crate::connection::NatsConnection;
use crate::error::NetError;
use crate::messages::DeliveryMethod;
use crate::peer::{ConnectionStatus, NetPeer, PeerEvent};
use crate::subjects;

/// How long a client waits for the server to answer its hail.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// What travels on the NATS subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Envelope {
    Hail { hail: Vec<u8> },
    Approved { conn: u64, hail: Vec<u8> },
    Denied { reason: String },
    Data { payload: Vec<u8> },
    Disconnect { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Server,
    Client,
}

/// A [`NetPeer`] over NATS.
#[derive(Debug)]
pub struct NatsPeer {
    connection: NatsConnection,
    prefix: String,
    side: Side,
    handle: Handle,
    events_tx: UnboundedSender<PeerEvent>,
    events_rx: UnboundedReceiver<PeerEvent>,
    pending: Arc<DashMap<ConnectionId, async_nats::Subject>>,
    readers: DashMap<ConnectionId, JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl NatsPeer {
    fn new(connection: NatsConnection, prefix: &str, side: Side) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            connection,
            prefix: prefix.to_string(),
            side,
            handle: Handle::current(),
            events_tx,
            events_rx,
            pending: Arc::new(DashMap::new()),
            readers: DashMap::new(),
            listener: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Start a server peer listening for hails on `<prefix>.connect`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the handshake subject cannot be
    /// subscribed.
    pub async fn server(connection: NatsConnection, prefix: &str) -> Result<Self, NetError> {
        let mut peer = Self::new(connection, prefix, Side::Server);
        let mut hails = peer.connection.subscribe(&subjects::connect(prefix)).await?;
        let tx = peer.events_tx.clone();
        let pending = Arc::clone(&peer.pending);
        let mut next_conn = 1u64;

        peer.listener = Some(tokio::spawn(async move {
            while let Some(msg) = hails.next().await {
                let Some(reply) = msg.reply.clone() else {
                    warn!(subject = %msg.subject, "hail without reply subject");
                    continue;
                };
                match codec::decode::<Envelope>(&msg.payload) {
                    Ok(Envelope::Hail { hail }) => {
                        let conn = ConnectionId(next_conn);
                        next_conn += 1;
                        pending.insert(conn, reply);
                        if tx.send(PeerEvent::ApprovalRequest { conn, hail }).is_err() {
                            break;
                        }
                    }
                    Ok(other) => warn!(?other, "unexpected envelope on connect subject"),
                    Err(e) => warn!(%e, "undecodable hail"),
                }
            }
        }));
        info!(prefix, "NATS server peer listening");
        Ok(peer)
    }

    /// Create a client peer. Nothing is sent until [`NetPeer::connect`].
    pub async fn client(connection: NatsConnection, prefix: &str) -> Self {
        Self::new(connection, prefix, Side::Client)
    }

    /// Override how long a client waits for approval.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn outbound_subject(&self, conn: ConnectionId) -> String {
        match self.side {
            Side::Server => subjects::conn_down(&self.prefix, conn.0),
            Side::Client => subjects::conn_up(&self.prefix, conn.0),
        }
    }

    fn publish(&self, subject: String, envelope: Envelope) {
        let connection = self.connection.clone();
        self.handle.spawn(async move {
            if let Err(e) = connection.publish(&subject, &envelope).await {
                warn!(subject, %e, "NATS publish failed");
            }
        });
    }
}

/// Forward frames from `subscriber` until the remote side disconnects.
async fn read_frames(
    mut subscriber: async_nats::Subscriber,
    conn: ConnectionId,
    tx: UnboundedSender<PeerEvent>,
) {
    while let Some(msg) = subscriber.next().await {
        match codec::decode::<Envelope>(&msg.payload) {
            Ok(Envelope::Data { payload }) => {
                if tx.send(PeerEvent::Data { conn, payload }).is_err() {
                    return;
                }
            }
            Ok(Envelope::Disconnect { reason }) => {
                let _ = tx.send(PeerEvent::StatusChanged {
                    conn,
                    status: ConnectionStatus::Disconnected,
                    remote_id: conn.0,
                    reason,
                    hail: None,
                });
                return;
            }
            Ok(other) => warn!(%conn, ?other, "unexpected envelope on data subject"),
            Err(e) => warn!(%conn, %e, "undecodable envelope"),
        }
    }
}

fn connect_failed(reason: String) -> PeerEvent {
    PeerEvent::StatusChanged {
        conn: ConnectionId(0),
        status: ConnectionStatus::Disconnected,
        remote_id: 0,
        reason,
        hail: None,
    }
}

impl NetPeer for NatsPeer {
    fn poll(&mut self) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    // Every method is published at most once; see the module docs.
    fn send(&mut self, conn: ConnectionId, payload: Vec<u8>, _method: DeliveryMethod) {
        let subject = self.outbound_subject(conn);
        self.publish(subject, Envelope::Data { payload });
    }

    fn connect(&mut self, hail: Vec<u8>) {
        if self.side != Side::Client {
            warn!("connect called on a server peer");
            return;
        }
        let connection = self.connection.clone();
        let prefix = self.prefix.clone();
        let tx = self.events_tx.clone();
        let timeout = self.connect_timeout;

        self.listener = Some(self.handle.spawn(async move {
            let subject = subjects::connect(&prefix);
            let hail = Envelope::Hail { hail };
            let request = connection.request::<_, Envelope>(&subject, &hail);
            let reply = match tokio::time::timeout(timeout, request).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    let _ = tx.send(connect_failed(e.to_string()));
                    return;
                }
                Err(_) => {
                    let _ = tx.send(connect_failed("connection timed out".to_string()));
                    return;
                }
            };

            match reply {
                Envelope::Approved { conn, hail } => {
                    let conn = ConnectionId(conn);
                    let subscriber = match connection.subscribe(&subjects::conn_down(&prefix, conn.0)).await {
                        Ok(sub) => sub,
                        Err(e) => {
                            let _ = tx.send(connect_failed(e.to_string()));
                            return;
                        }
                    };
                    let connected = PeerEvent::StatusChanged {
                        conn,
                        status: ConnectionStatus::Connected,
                        remote_id: conn.0,
                        reason: String::new(),
                        hail: Some(hail),
                    };
                    if tx.send(connected).is_ok() {
                        read_frames(subscriber, conn, tx).await;
                    }
                }
                Envelope::Denied { reason } => {
                    let _ = tx.send(connect_failed(reason));
                }
                other => {
                    let _ = tx.send(connect_failed(format!("unexpected handshake reply: {other:?}")));
                }
            }
        }));
    }

    fn approve(&mut self, conn: ConnectionId, hail: Vec<u8>) {
        let Some((_, reply)) = self.pending.remove(&conn) else {
            debug!(%conn, "approve for unknown pending connection");
            return;
        };
        let connection = self.connection.clone();
        let up = subjects::conn_up(&self.prefix, conn.0);
        let tx = self.events_tx.clone();

        let reader = self.handle.spawn(async move {
            // Subscribe before replying so no early frame is missed.
            let subscriber = match connection.subscribe(&up).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(%conn, %e, "failed to subscribe client subject");
                    return;
                }
            };
            let approved = Envelope::Approved { conn: conn.0, hail };
            if let Err(e) = connection.reply(reply, &approved).await {
                warn!(%conn, %e, "failed to reply to hail");
                return;
            }
            let connected = PeerEvent::StatusChanged {
                conn,
                status: ConnectionStatus::Connected,
                remote_id: conn.0,
                reason: String::new(),
                hail: None,
            };
            if tx.send(connected).is_ok() {
                read_frames(subscriber, conn, tx).await;
            }
        });
        self.readers.insert(conn, reader);
    }

    fn deny(&mut self, conn: ConnectionId, reason: &str) {
        if let Some((_, reply)) = self.pending.remove(&conn) {
            self.publish(reply.to_string(), Envelope::Denied { reason: reason.to_string() });
        }
    }

    fn disconnect(&mut self, conn: ConnectionId, reason: &str) {
        let subject = self.outbound_subject(conn);
        self.publish(subject, Envelope::Disconnect { reason: reason.to_string() });
        if let Some((_, reader)) = self.readers.remove(&conn) {
            reader.abort();
        }
        if self.side == Side::Client
            && let Some(listener) = self.listener.take()
        {
            listener.abort();
        }
        let _ = self.events_tx.send(PeerEvent::StatusChanged {
            conn,
            status: ConnectionStatus::Disconnected,
            remote_id: conn.0,
            reason: reason.to_string(),
            hail: None,
        });
    }

    fn shutdown(&mut self, reason: &str) {
        let conns: Vec<ConnectionId> = self.readers.iter().map(|e| *e.key()).collect();
        for conn in conns {
            self.disconnect(conn, reason);
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        info!(reason, "NATS peer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::Approved {
            conn: 3,
            hail: vec![1, 2, 3],
        };
        let bytes = codec::encode(&envelope).unwrap();
        let restored: Envelope = codec::decode(&bytes).unwrap();
        assert_eq!(envelope, restored);
    }

    #[test]
    fn test_connect_failed_has_zero_remote_id() {
        let PeerEvent::StatusChanged { remote_id, status, .. } = connect_failed("nope".into()) else {
            panic!("expected status event");
        };
        assert_eq!(remote_id, 0);
        assert_eq!(status, ConnectionStatus::Disconnected);
    }
}
