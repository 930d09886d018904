//! Shared NATS client handle.
//!
//! One [`NatsConnection`] is opened per process and cloned into every peer
//! task. Payloads on the wire are MessagePack; subjects come from
//! [`subjects`](crate::subjects).

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::codec;
use crate::error::NetError;

/// Server used when neither a URL nor `NATS_URL` is given.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// Environment variable naming the NATS server.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Name this process reports to the NATS server.
const CLIENT_NAME: &str = "sim";

/// The URL to connect to: `explicit` if given, else `NATS_URL`, else
/// [`DEFAULT_NATS_URL`].
#[must_use]
pub fn resolve_url(explicit: Option<&str>) -> String {
    match explicit {
        Some(url) => url.to_string(),
        None => std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string()),
    }
}

/// A connected NATS client.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    client: async_nats::Client,
    url: String,
}

impl NatsConnection {
    /// Connect to the server chosen by [`resolve_url`].
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the server cannot be reached.
    pub async fn open(url: Option<&str>) -> Result<Self, NetError> {
        let url = resolve_url(url);
        info!(%url, "connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .name(CLIENT_NAME)
            .connect(url.as_str())
            .await?;
        info!(%url, "NATS connection established");
        Ok(Self { client, url })
    }

    /// The URL this connection was opened with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Encode `message` and publish it on `subject`.
    ///
    /// # Errors
    ///
    /// Fails if encoding or publishing fails.
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> Result<(), NetError> {
        let payload = codec::encode(message)?;
        self.client.publish(subject.to_string(), payload.into()).await?;
        Ok(())
    }

    /// Encode `message` and publish it to the inbox of a request.
    ///
    /// # Errors
    ///
    /// Fails if encoding or publishing fails.
    pub async fn reply<T: Serialize>(&self, inbox: async_nats::Subject, message: &T) -> Result<(), NetError> {
        let payload = codec::encode(message)?;
        self.client.publish(inbox, payload.into()).await?;
        Ok(())
    }

    /// Send `message` as a request on `subject` and decode the answer.
    ///
    /// # Errors
    ///
    /// Fails if encoding, the request or decoding the answer fails.
    pub async fn request<T, R>(&self, subject: &str, message: &T) -> Result<R, NetError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let payload = codec::encode(message)?;
        let answer = self.client.request(subject.to_string(), payload.into()).await?;
        codec::decode(&answer.payload)
    }

    /// Subscribe to `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        Ok(self.client.subscribe(subject.to_string()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_url_wins() {
        assert_eq!(resolve_url(Some("nats://relay:4333")), "nats://relay:4333");
    }
}
