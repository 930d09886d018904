//! # sim_net
//!
//! Connection-oriented message transport for the replicated simulation.
//!
//! This crate provides:
//!
//! - [`manager`] — the [`NetManager`]: handshake, string table sync and
//!   typed message dispatch.
//! - [`peer`] — the [`NetPeer`] transport seam.
//! - [`loopback`] — an in-process peer pair, optionally lossy.
//! - [`nats`] — a peer over NATS subjects.
//! - [`messages`] — the message contract and built-in messages.
//! - [`string_table`] — message name ↔ id mapping.
//! - [`codec`] — MessagePack and frame helpers.

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod loopback;
pub mod manager;
pub mod messages;
pub mod nats;
pub mod peer;
pub mod string_table;
pub mod subjects;

pub use channel::{ConnectionId, ConnectionState, NetChannel, NetworkStats, SessionId};
pub use codec::{decode, encode};
pub use connection::NatsConnection;
pub use error::NetError;
pub use loopback::{LoopbackClientPeer, LoopbackConfig, LoopbackNetwork, LoopbackServerPeer};
pub use manager::{NetEvent, NetManager, NetSide};
pub use messages::{DeliveryMethod, MsgGroup, MsgServerInfo, MsgServerInfoReq, MsgStringTable, NetMessage};
pub use nats::NatsPeer;
pub use peer::{ConnectionStatus, NetPeer, PeerEvent, PeerLogLevel};
pub use string_table::StringTable;
