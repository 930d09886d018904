//! Connection and message management.
//!
//! [`NetManager`] sits between a [`NetPeer`] and the simulation. Once per
//! tick the simulation calls [`NetManager::process_packets`], which drains
//! the peer, runs the handshake state machine, and dispatches every decoded
//! message to the callback registered for its type.
//!
//! Callbacks receive a caller-supplied context `C` (the simulation state)
//! together with the [`NetChannel`] the message arrived on. Anything a
//! callback wants to send back is queued in the context and sent after
//! `process_packets` returns.
//!
//! A malformed, unknown or unhandled frame is logged and dropped; it never
//! disturbs the rest of the batch.

use std::collections::HashMap;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::channel::{ConnectionId, ConnectionState, NetChannel, NetworkStats, SessionId};
use crate::codec;
use crate::error::NetError;
use crate::messages::{ConnectApproval, ConnectHail, DeliveryMethod, MsgGroup, MsgStringTable, NetMessage};
use crate::peer::{ConnectionStatus, NetPeer, PeerEvent, PeerLogLevel};
use crate::string_table::StringTable;

/// Longest user name accepted during approval.
pub const MAX_USERNAME_LEN: usize = 32;

/// Deny reason for malformed or disallowed user names.
pub const DENY_INVALID_NAME: &str = "Username is invalid (contains illegal characters/too long).";

/// Deny reason when the server has no free slot.
pub const DENY_SERVER_FULL: &str = "Server is full.";

type Handler<C> = Box<dyn FnMut(&mut C, &NetChannel, &[u8]) -> Result<(), NetError> + Send>;

struct MessageEntry<C> {
    group: MsgGroup,
    handler: Option<Handler<C>>,
}

/// Which end of the connection this manager is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetSide {
    Server,
    Client,
}

/// Connection-level outcome of [`NetManager::process_packets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A channel became usable.
    Connected { conn: ConnectionId, session: SessionId },
    /// A usable or connected channel went away.
    Disconnected {
        conn: ConnectionId,
        session: SessionId,
        reason: String,
    },
    /// An outgoing connection attempt failed or was denied.
    ConnectFailed { reason: String },
}

/// Returns `true` if `name` may be used as a session name.
#[must_use]
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ')
}

/// Manages every connection and all message IO of one process.
pub struct NetManager<C> {
    side: NetSide,
    peer: Box<dyn NetPeer>,
    strings: StringTable,
    messages: HashMap<&'static str, MessageEntry<C>>,
    channels: DashMap<ConnectionId, NetChannel>,
    pending: DashMap<ConnectionId, (SessionId, ConnectionState)>,
    max_connections: usize,
    stats: NetworkStats,
    connecting: bool,
}

impl<C: 'static> NetManager<C> {
    /// Create a server-side manager accepting up to `max_connections`.
    #[must_use]
    pub fn server(peer: Box<dyn NetPeer>, max_connections: usize) -> Self {
        Self::new(NetSide::Server, peer, max_connections)
    }

    /// Create a client-side manager.
    #[must_use]
    pub fn client(peer: Box<dyn NetPeer>) -> Self {
        Self::new(NetSide::Client, peer, 1)
    }

    fn new(side: NetSide, peer: Box<dyn NetPeer>, max_connections: usize) -> Self {
        Self {
            side,
            peer,
            strings: StringTable::new(),
            messages: HashMap::new(),
            channels: DashMap::new(),
            pending: DashMap::new(),
            max_connections,
            stats: NetworkStats::default(),
            connecting: false,
        }
    }

    // ── Registration ───────────────────────────────────────────────────────

    /// Register message type `T` with a receive callback.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::DuplicateMessage`] if `T` is already registered.
    pub fn register_net_message<T, F>(&mut self, mut handler: F) -> Result<(), NetError>
    where
        T: NetMessage,
        F: FnMut(&mut C, &NetChannel, T) + Send + 'static,
    {
        let wrapped: Handler<C> = Box::new(move |ctx, channel, body| {
            let message: T = codec::decode(body)?;
            handler(ctx, channel, message);
            Ok(())
        });
        self.register_entry::<T>(Some(wrapped))
    }

    /// Register message type `T` for sending only.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::DuplicateMessage`] if `T` is already registered.
    pub fn register_outgoing<T: NetMessage>(&mut self) -> Result<(), NetError> {
        self.register_entry::<T>(None)
    }

    fn register_entry<T: NetMessage>(&mut self, handler: Option<Handler<C>>) -> Result<(), NetError> {
        if T::NAME == MsgStringTable::NAME || self.messages.contains_key(T::NAME) {
            return Err(NetError::DuplicateMessage(T::NAME));
        }
        self.strings.add_string(T::NAME);
        self.messages.insert(
            T::NAME,
            MessageEntry {
                group: T::GROUP,
                handler,
            },
        );
        Ok(())
    }

    // ── Packet processing ──────────────────────────────────────────────────

    /// Drain the peer and handle everything that arrived.
    pub fn process_packets(&mut self, ctx: &mut C) -> Vec<NetEvent> {
        let mut events = Vec::new();
        for event in self.peer.poll() {
            match event {
                PeerEvent::Log { level, message } => match level {
                    PeerLogLevel::Debug => debug!(message, "peer"),
                    PeerLogLevel::Warning => warn!(message, "peer"),
                    PeerLogLevel::Error => error!(message, "peer"),
                },
                PeerEvent::ApprovalRequest { conn, hail } => self.handle_approval(conn, &hail),
                PeerEvent::StatusChanged {
                    conn,
                    status,
                    remote_id,
                    reason,
                    hail,
                } => {
                    debug!(%conn, ?status, "status changed");
                    let event = match status {
                        ConnectionStatus::Connected => self.handle_connected(conn, hail.as_deref()),
                        ConnectionStatus::Disconnected => self.handle_disconnected(conn, remote_id, reason),
                    };
                    events.extend(event);
                }
                PeerEvent::Data { conn, payload } => {
                    events.extend(self.dispatch(ctx, conn, &payload));
                }
            }
        }
        events
    }

    fn session_taken(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.session().username == name)
            || self.pending.iter().any(|p| p.value().0.username == name)
    }

    fn handle_approval(&mut self, conn: ConnectionId, hail: &[u8]) {
        if self.side != NetSide::Server {
            warn!(%conn, "approval request on a client");
            return;
        }
        let hail: ConnectHail = match codec::decode(hail) {
            Ok(hail) => hail,
            Err(e) => {
                warn!(%conn, %e, "malformed hail");
                self.peer.deny(conn, DENY_INVALID_NAME);
                return;
            }
        };
        if !is_valid_username(&hail.username) {
            info!(%conn, username = hail.username, "denied: invalid username");
            self.peer.deny(conn, DENY_INVALID_NAME);
            return;
        }

        let mut name = hail.username.clone();
        let mut iterations = 1;
        while self.session_taken(&name) {
            iterations += 1;
            name = format!("{}_{iterations}", hail.username);
        }

        if self.channels.len() + self.pending.len() >= self.max_connections {
            info!(%conn, username = name, "denied: server full");
            self.peer.deny(conn, DENY_SERVER_FULL);
            return;
        }

        let session = SessionId::new(name);
        let reply = match codec::encode(&ConnectApproval {
            session: session.clone(),
        }) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%conn, %e, "failed to encode approval");
                self.peer.deny(conn, DENY_INVALID_NAME);
                return;
            }
        };
        debug!(%conn, %session, instance = hail.instance_id, "approving connection");
        self.pending.insert(conn, (session, ConnectionState::Approval));
        self.peer.approve(conn, reply);
    }

    fn handle_connected(&mut self, conn: ConnectionId, hail: Option<&[u8]>) -> Option<NetEvent> {
        let session = match self.side {
            NetSide::Server => match self.pending.remove(&conn) {
                Some((_, (session, _))) => session,
                None => {
                    warn!(%conn, "connected without approval");
                    return None;
                }
            },
            NetSide::Client => {
                self.connecting = false;
                match hail.map(codec::decode::<ConnectApproval>) {
                    Some(Ok(approval)) => approval.session,
                    _ => {
                        warn!(%conn, "approval reply missing or malformed");
                        self.peer.disconnect(conn, "malformed approval");
                        return None;
                    }
                }
            }
        };

        info!(%conn, %session, "connected");
        self.channels.insert(conn, NetChannel::new(conn, session.clone()));

        match self.side {
            NetSide::Server => {
                self.send_string_table(conn);
                if let Some(mut channel) = self.channels.get_mut(&conn) {
                    channel.set_state(ConnectionState::Usable);
                }
                Some(NetEvent::Connected { conn, session })
            }
            // The client is connected once the string table arrives.
            NetSide::Client => None,
        }
    }

    fn handle_disconnected(&mut self, conn: ConnectionId, remote_id: u64, reason: String) -> Option<NetEvent> {
        if let Some((_, mut channel)) = self.channels.remove(&conn) {
            channel.set_state(ConnectionState::Disconnected);
            info!(%conn, session = %channel.session(), reason, "disconnected");
            if self.side == NetSide::Client {
                self.strings.reset();
            }
            return Some(NetEvent::Disconnected {
                conn,
                session: channel.session().clone(),
                reason,
            });
        }
        if self.pending.remove(&conn).is_some() {
            debug!(%conn, reason, "pending connection dropped");
            return None;
        }
        if remote_id == 0 {
            info!(%conn, reason, "failed to connect");
            self.connecting = false;
            return Some(NetEvent::ConnectFailed { reason });
        }
        None
    }

    fn dispatch(&mut self, ctx: &mut C, conn: ConnectionId, payload: &[u8]) -> Option<NetEvent> {
        if payload.is_empty() {
            warn!(%conn, "received empty packet");
            return None;
        }
        let (id, body) = match codec::decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%conn, %e, "malformed frame");
                return None;
            }
        };
        let Some(name) = self.strings.try_get_string(id).map(str::to_string) else {
            warn!(%conn, id, "no string in table with id");
            return None;
        };

        let channel = {
            let Some(mut channel) = self.channels.get_mut(&conn) else {
                warn!(%conn, name, "packet from unknown connection");
                return None;
            };
            channel.stats_mut().record_received(payload.len());
            channel.clone()
        };
        self.stats.record_received(payload.len());

        if name == MsgStringTable::NAME {
            return self.handle_string_table(conn, body);
        }
        if !channel.is_usable() {
            debug!(%conn, name, "dropping packet on unusable channel");
            return None;
        }

        let Some(entry) = self.messages.get_mut(name.as_str()) else {
            warn!(%conn, name, "no message with name");
            return None;
        };
        let Some(handler) = entry.handler.as_mut() else {
            warn!(%conn, id, name, "received packet, but callback was not registered");
            return None;
        };
        if let Err(e) = handler(ctx, &channel, body) {
            warn!(%conn, name, %e, "failed to deserialize packet");
        }
        None
    }

    fn handle_string_table(&mut self, conn: ConnectionId, body: &[u8]) -> Option<NetEvent> {
        if self.side != NetSide::Client {
            warn!(%conn, "string table sent to server");
            return None;
        }
        let table: MsgStringTable = match codec::decode(body) {
            Ok(table) => table,
            Err(e) => {
                warn!(%conn, %e, "failed to decode string table");
                return None;
            }
        };
        self.strings.apply(&table);
        let mut channel = self.channels.get_mut(&conn)?;
        channel.set_state(ConnectionState::Usable);
        debug!(%conn, entries = table.entries.len(), "string table received");
        Some(NetEvent::Connected {
            conn,
            session: channel.session().clone(),
        })
    }

    // ── Sending ────────────────────────────────────────────────────────────

    fn send_raw(&mut self, conn: ConnectionId, id: u32, body: &[u8], method: DeliveryMethod) {
        let frame = codec::encode_frame(id, body);
        if let Some(mut channel) = self.channels.get_mut(&conn) {
            channel.stats_mut().record_sent(frame.len());
        }
        self.stats.record_sent(frame.len());
        self.peer.send(conn, frame, method);
    }

    fn send_string_table(&mut self, conn: ConnectionId) {
        match codec::encode(&self.strings.to_message()) {
            Ok(body) => self.send_raw(conn, 0, &body, MsgGroup::String.delivery_method()),
            Err(e) => warn!(%conn, %e, "failed to encode string table"),
        }
    }

    fn build<T: NetMessage>(&self, message: &T) -> Result<(u32, Vec<u8>), NetError> {
        let id = self
            .strings
            .try_find_id(T::NAME)
            .ok_or(NetError::UnregisteredMessage(T::NAME))?;
        Ok((id, codec::encode(message)?))
    }

    /// Send a message to one connection.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the channel is unknown, or encoding
    /// fails.
    pub fn server_send_message<T: NetMessage>(&mut self, conn: ConnectionId, message: &T) -> Result<(), NetError> {
        if !self.channels.contains_key(&conn) {
            return Err(NetError::UnknownConnection(conn));
        }
        let (id, body) = self.build(message)?;
        self.send_raw(conn, id, &body, T::GROUP.delivery_method());
        Ok(())
    }

    /// Send a message to every usable channel. Returns the recipient count.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered or encoding fails.
    pub fn server_send_to_all<T: NetMessage>(&mut self, message: &T) -> Result<usize, NetError> {
        let (id, body) = self.build(message)?;
        let recipients: Vec<ConnectionId> = self
            .channels
            .iter()
            .filter(|c| c.is_usable())
            .map(|c| c.connection())
            .collect();
        for conn in &recipients {
            self.send_raw(*conn, id, &body, T::GROUP.delivery_method());
        }
        Ok(recipients.len())
    }

    /// Send a message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] without a usable server channel.
    pub fn client_send_message<T: NetMessage>(&mut self, message: &T) -> Result<(), NetError> {
        let conn = self.server_channel().ok_or(NetError::NotConnected)?;
        let (id, body) = self.build(message)?;
        self.send_raw(conn, id, &body, T::GROUP.delivery_method());
        Ok(())
    }

    // ── Connection control ─────────────────────────────────────────────────

    /// Ask the server for a session named `username`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Encode`] if the hail cannot be encoded.
    pub fn client_connect(&mut self, username: &str) -> Result<(), NetError> {
        if let Some(conn) = self.server_channel_any() {
            self.peer.disconnect(conn, "Client left server.");
        }
        let hail = ConnectHail {
            username: username.to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        };
        info!(username, instance = hail.instance_id, "connecting");
        self.connecting = true;
        self.peer.connect(codec::encode(&hail)?);
        Ok(())
    }

    /// Leave the server.
    pub fn client_disconnect(&mut self, reason: &str) {
        if let Some(conn) = self.server_channel_any() {
            self.peer.disconnect(conn, reason);
        }
    }

    /// Close one channel.
    pub fn disconnect_channel(&mut self, conn: ConnectionId, reason: &str) {
        self.peer.disconnect(conn, reason);
    }

    /// Close every channel and stop the peer.
    pub fn shutdown(&mut self, reason: &str) {
        let conns: Vec<ConnectionId> = self.channels.iter().map(|c| c.connection()).collect();
        for conn in conns {
            self.peer.disconnect(conn, reason);
        }
        self.peer.shutdown(reason);
        self.strings.reset();
        info!(reason, "network shut down");
    }

    // ── Introspection ──────────────────────────────────────────────────────

    /// Which side this manager is.
    #[must_use]
    pub fn side(&self) -> NetSide {
        self.side
    }

    /// Whether any channel is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channels.iter().any(|c| c.is_usable())
    }

    /// Whether a client connection attempt is outstanding.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    fn server_channel_any(&self) -> Option<ConnectionId> {
        self.channels.iter().next().map(|c| c.connection())
    }

    /// The usable channel to the server (client side).
    #[must_use]
    pub fn server_channel(&self) -> Option<ConnectionId> {
        self.channels
            .iter()
            .find(|c| c.is_usable())
            .map(|c| c.connection())
    }

    /// A snapshot of one channel.
    #[must_use]
    pub fn channel(&self, conn: ConnectionId) -> Option<NetChannel> {
        self.channels.get(&conn).map(|c| c.clone())
    }

    /// Snapshots of every channel.
    #[must_use]
    pub fn channels(&self) -> Vec<NetChannel> {
        self.channels.iter().map(|c| c.clone()).collect()
    }

    /// Number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Lifecycle state of a connection, pending ones included.
    #[must_use]
    pub fn connection_state(&self, conn: ConnectionId) -> Option<ConnectionState> {
        self.channels
            .get(&conn)
            .map(|c| c.state())
            .or_else(|| self.pending.get(&conn).map(|p| p.value().1))
    }

    /// Id currently assigned to a message name.
    #[must_use]
    pub fn message_id(&self, name: &str) -> Option<u32> {
        self.strings.try_find_id(name)
    }

    /// Group of a registered message.
    #[must_use]
    pub fn message_group(&self, name: &str) -> Option<MsgGroup> {
        self.messages.get(name).map(|e| e.group)
    }

    /// Aggregate traffic counters.
    #[must_use]
    pub fn statistics(&self) -> NetworkStats {
        self.stats
    }
}

impl<C> std::fmt::Debug for NetManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetManager")
            .field("side", &self.side)
            .field("channels", &self.channels.len())
            .field("messages", &self.messages.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
