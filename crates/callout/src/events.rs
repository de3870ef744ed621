//! System events published by the NATS server.
//!
//! Only the fields the reaper reads (`client.acc`, `client.name`,
//! `client.id`) matter; the rest is kept so that events can be logged in
//! full. Every field is optional on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type of a client disconnect advisory.
pub const DISCONNECT_EVENT_TYPE: &str = "io.nats.server.advisory.v1.client_disconnect";

/// Payload of `$SYS.ACCOUNT.<account>.DISCONNECT`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectEvent {
    /// Advisory type, normally [`DISCONNECT_EVENT_TYPE`].
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unique event id.
    pub id: String,
    /// When the event was emitted.
    pub timestamp: Option<DateTime<Utc>>,
    /// Server that saw the disconnect.
    pub server: EventServer,
    /// The client that went away.
    pub client: EventClient,
    /// Traffic sent to the client.
    pub sent: DataStats,
    /// Traffic received from the client.
    pub received: DataStats,
    /// Why the connection closed.
    pub reason: String,
}

/// Server metadata attached to system events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventServer {
    pub name: String,
    pub host: String,
    pub id: String,
    pub ver: String,
    pub jetstream: bool,
    pub flags: u64,
    pub seq: u64,
    pub time: Option<DateTime<Utc>>,
}

/// Client metadata attached to connect and disconnect events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventClient {
    pub start: Option<DateTime<Utc>>,
    pub host: String,
    /// Connection id, the owner value stored in a reservation.
    pub id: u64,
    /// Account the connection was bound to.
    #[serde(rename = "acc")]
    pub account: String,
    /// Display name from CONNECT.
    pub name: String,
    pub lang: String,
    pub ver: String,
    pub rtt: Rtt,
    pub stop: Option<DateTime<Utc>>,
    pub issuer_key: String,
    pub kind: String,
    pub client_type: String,
}

/// Round-trip time as reported by the server.
///
/// Current servers send a Go duration string (`"1.2ms"`); an integer
/// nanosecond count is also accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rtt {
    Nanos(i64),
    Text(String),
}

impl Default for Rtt {
    fn default() -> Self {
        Self::Nanos(0)
    }
}

/// Message and byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStats {
    #[serde(rename = "msgs")]
    pub messages: u64,
    pub bytes: u64,
}
