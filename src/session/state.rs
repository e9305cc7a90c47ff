//! Connection state machine.

use std::fmt;

/// Lifecycle state of a [`SessionEngine`](super::SessionEngine).
///
/// ```text
/// Unconnected → Handshaking → Upgrading → Connected → Disconnected
///      ▲             │            │
///      └─────────────┴── failure ─┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection attempt in progress.
    #[default]
    Unconnected,
    /// Session handshake over HTTP.
    Handshaking,
    /// Upgrade exchange on the raw stream.
    Upgrading,
    /// Frames flowing.
    Connected,
    /// Closed locally or by the peer. Terminal.
    Disconnected,
}

impl ConnectionState {
    /// Returns `true` while a connection attempt is running.
    #[inline]
    #[must_use]
    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Handshaking | Self::Upgrading)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Handshaking => "handshaking",
            Self::Upgrading => "upgrading",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Unconnected);
    }

    #[test]
    fn test_is_connecting() {
        assert!(ConnectionState::Handshaking.is_connecting());
        assert!(ConnectionState::Upgrading.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
