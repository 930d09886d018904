//! Message contract and the built-in messages of the transport.
//!
//! A message type is any serde type with a unique [`NetMessage::NAME`] and a
//! [`MsgGroup`]. The name is what the string table maps to a compact id; the
//! group decides how reliably the message is delivered.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::channel::SessionId;

/// Delivery guarantee requested from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMethod {
    /// May be lost, duplicated or reordered.
    Unreliable,
    /// Always arrives, in any order.
    ReliableUnordered,
    /// Always arrives, in send order.
    ReliableOrdered,
}

/// Logical message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgGroup {
    /// Connection and session bookkeeping.
    Core,
    /// Entity replication; superseded by the next snapshot when lost.
    Entity,
    /// String table synchronisation.
    String,
    /// Console and admin commands.
    Command,
}

impl MsgGroup {
    /// The delivery method used for every message of this group.
    #[must_use]
    pub const fn delivery_method(self) -> DeliveryMethod {
        match self {
            Self::Entity => DeliveryMethod::Unreliable,
            Self::Core | Self::String | Self::Command => DeliveryMethod::ReliableUnordered,
        }
    }
}

/// A message that can be sent through a [`NetManager`](crate::NetManager).
pub trait NetMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Unique message name, synced through the string table.
    const NAME: &'static str;
    /// Delivery category.
    const GROUP: MsgGroup;
}

// ── Handshake ───────────────────────────────────────────────────────────────

/// Sent by a client when it asks to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectHail {
    /// Requested user name.
    pub username: String,
    /// Random id of the client process, for logs.
    pub instance_id: String,
}

/// Returned with an approval: the name the server actually assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectApproval {
    /// The session the server created for this login.
    pub session: SessionId,
}

// ── Built-in messages ───────────────────────────────────────────────────────

/// The full message-name table, sent by the server when a channel connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgStringTable {
    /// `(id, name)` pairs.
    pub entries: Vec<(u32, String)>,
}

impl NetMessage for MsgStringTable {
    const NAME: &'static str = "MsgStringTable";
    const GROUP: MsgGroup = MsgGroup::String;
}

/// Client request for [`MsgServerInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgServerInfoReq;

impl NetMessage for MsgServerInfoReq {
    const NAME: &'static str = "MsgServerInfoReq";
    const GROUP: MsgGroup = MsgGroup::Core;
}

/// Server name and capacity, plus the session the client was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgServerInfo {
    /// Display name of the server.
    pub server_name: String,
    /// Maximum concurrent players.
    pub max_players: u32,
    /// The receiving client's session.
    pub session: SessionId,
}

impl NetMessage for MsgServerInfo {
    const NAME: &'static str = "MsgServerInfo";
    const GROUP: MsgGroup = MsgGroup::Core;
}
