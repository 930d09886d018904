//! Transport error types.

use crate::channel::ConnectionId;

/// Errors raised by the codec, the message registry and the NATS peer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A frame was empty or its message id was truncated.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// A message type was sent before being registered.
    #[error("no string in table with name '{0}', was it registered?")]
    UnregisteredMessage(&'static str),

    #[error("message '{0}' is already registered")]
    DuplicateMessage(&'static str),

    #[error("no channel for {0}")]
    UnknownConnection(ConnectionId),

    /// The operation needs a usable channel.
    #[error("not connected")]
    NotConnected,

    #[error("NATS subscribe failed: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    #[error("NATS publish failed: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// The hail request timed out or found no server.
    #[error("NATS request failed: {0}")]
    Request(#[from] async_nats::RequestError),

    #[error("could not reach NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),
}
