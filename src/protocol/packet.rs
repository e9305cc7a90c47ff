//! socket.io 0.9 packet multiplexing.
//!
//! Every frame payload carries one packet in the form
//! `type:id:endpoint:data`. The data field is not escaped, so parsing
//! splits into at most four fields and the last one keeps any remaining
//! colons.
//!
//! # Packet Types
//!
//! | Code | Type | Purpose |
//! |------|------|---------|
//! | 0 | `Disconnect` | Leave a namespace or close the session |
//! | 1 | `Connect` | Join a namespace / server connect ack |
//! | 2 | `Heartbeat` | Keepalive |
//! | 3 | `Message` | Plain message |
//! | 4 | `JsonMessage` | JSON message |
//! | 5 | `Event` | Named event `{"name", "args"}` |
//! | 6 | `Ack` | Acknowledgement |
//! | 7 | `Error` | Error report |
//! | 8 | `Noop` | No operation |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// PacketType
// ============================================================================

/// Packet type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Leave a namespace or close the session.
    Disconnect = 0,
    /// Join a namespace.
    Connect = 1,
    /// Keepalive.
    Heartbeat = 2,
    /// Plain message.
    Message = 3,
    /// JSON message.
    JsonMessage = 4,
    /// Named event.
    Event = 5,
    /// Acknowledgement.
    Ack = 6,
    /// Error report.
    Error = 7,
    /// No operation.
    Noop = 8,
}

impl PacketType {
    /// Returns the numeric wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Disconnect),
            1 => Ok(Self::Connect),
            2 => Ok(Self::Heartbeat),
            3 => Ok(Self::Message),
            4 => Ok(Self::JsonMessage),
            5 => Ok(Self::Event),
            6 => Ok(Self::Ack),
            7 => Ok(Self::Error),
            8 => Ok(Self::Noop),
            _ => Err(Error::invalid_argument(format!(
                "packet type must be lower than 9, got {code}"
            ))),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Packet
// ============================================================================

/// A multiplexed packet.
///
/// Empty wire fields are represented as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type.
    pub packet_type: PacketType,
    /// Message id.
    pub id: Option<String>,
    /// Namespace the packet is scoped to.
    pub endpoint: Option<String>,
    /// Raw data, may contain colons.
    pub data: Option<String>,
}

impl Packet {
    /// Creates a packet with no id, endpoint or data.
    #[inline]
    #[must_use]
    pub const fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            id: None,
            endpoint: None,
            data: None,
        }
    }

    /// Creates a heartbeat packet.
    #[inline]
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::new(PacketType::Heartbeat)
    }

    /// Creates a connect packet for a namespace.
    #[must_use]
    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(PacketType::Connect).with_endpoint(endpoint)
    }

    /// Creates a disconnect packet, optionally scoped to a namespace.
    #[must_use]
    pub fn disconnect(endpoint: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.map(str::to_owned),
            ..Self::new(PacketType::Disconnect)
        }
    }

    /// Creates an event packet for `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the arguments cannot be serialized.
    pub fn event(name: &str, args: Vec<Value>, endpoint: Option<&str>) -> Result<Self> {
        let data = serde_json::to_string(&EventMessage {
            name: name.to_owned(),
            args,
        })?;

        Ok(Self {
            endpoint: endpoint.map(str::to_owned),
            data: Some(data),
            ..Self::new(PacketType::Event)
        })
    }

    /// Sets the message id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = non_empty(id.into());
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = non_empty(endpoint.into());
        self
    }

    /// Sets the data field.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = non_empty(data.into());
        self
    }

    /// Parses a raw packet.
    ///
    /// Returns `None` when the type field is not one of the nine known
    /// codes; such packets are not acted upon.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.splitn(4, ':');

        let code: u8 = fields.next()?.parse().ok()?;
        let packet_type = PacketType::try_from(code).ok()?;

        let id = fields.next().map(str::to_owned).and_then(non_empty);
        let endpoint = fields.next().map(str::to_owned).and_then(non_empty);
        let data = fields.next().map(str::to_owned).and_then(non_empty);

        Some(Self {
            packet_type,
            id,
            endpoint,
            data,
        })
    }

    /// Decodes the `{"name", "args"}` body of an event packet.
    ///
    /// Returns `Ok(None)` for non-event packets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the data is not a valid event body.
    pub fn event_message(&self) -> Result<Option<EventMessage>> {
        if self.packet_type != PacketType::Event {
            return Ok(None);
        }

        let data = self.data.as_deref().unwrap_or_default();
        Ok(Some(serde_json::from_str(data)?))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.packet_type,
            self.id.as_deref().unwrap_or_default(),
            self.endpoint.as_deref().unwrap_or_default(),
            self.data.as_deref().unwrap_or_default()
        )
    }
}

#[inline]
fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

// ============================================================================
// EventMessage
// ============================================================================

/// Body of an `Event` packet.
///
/// # Format
///
/// ```json
/// { "name": "message", "args": [{ "message": "hi" }] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name.
    pub name: String,

    /// Event arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventMessage {
    /// Returns the first argument, the value handed to callbacks.
    #[inline]
    #[must_use]
    pub fn first_arg(&self) -> Value {
        self.args.first().cloned().unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================
