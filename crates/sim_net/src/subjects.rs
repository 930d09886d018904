//! NATS subject hierarchy.
//!
//! Every subject is namespaced under a configurable prefix so several
//! servers can share one NATS cluster:
//!
//! ```text
//! <prefix>.connect            client → server   (request/reply handshake)
//! <prefix>.conn.<id>.up       client → server   (frames)
//! <prefix>.conn.<id>.down     server → client   (frames)
//! ```

/// Default prefix for all simulation NATS subjects.
pub const PREFIX: &str = "sim";

/// Build the handshake subject.
///
/// `<prefix>.connect`
#[must_use]
pub fn connect(prefix: &str) -> String {
    format!("{prefix}.connect")
}

/// Build the subject carrying frames from a client to the server.
///
/// `<prefix>.conn.<id>.up`
#[must_use]
pub fn conn_up(prefix: &str, conn: u64) -> String {
    format!("{prefix}.conn.{conn}.up")
}

/// Build the subject carrying frames from the server to a client.
///
/// `<prefix>.conn.<id>.down`
#[must_use]
pub fn conn_down(prefix: &str, conn: u64) -> String {
    format!("{prefix}.conn.{conn}.down")
}
