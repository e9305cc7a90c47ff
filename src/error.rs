//! Error types for the socket.io client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use socketio_legacy::{Client, Result};
//!
//! async fn example() -> Result<()> {
//!     let mut socket = Client::new("http://localhost:3000").connect().await?;
//!     socket.emit("hello", vec![]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::Handshake`], [`Error::HandshakeStatus`] |
//! | Connection | [`Error::Socket`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::InvalidArgument`], [`Error::UnsupportedFrameSize`] |
//! | Dispatch | [`Error::Callback`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the client URL or options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Session handshake or upgrade failed.
    ///
    /// Returned for HTTP transport failures, empty or malformed handshake
    /// bodies, servers without websocket support, an unexpected upgrade
    /// status line, or a missing connect acknowledgement.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Handshake request answered with a non-200 status.
    #[error("Handshake rejected with HTTP {status}")]
    HandshakeStatus {
        /// HTTP status code.
        status: u16,
        /// Response headers, one `name: value` per line.
        headers: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Raw socket could not be opened or used.
    ///
    /// Returned when the TCP/TLS stream fails to open, when the server
    /// sends nothing in reply to the upgrade request, or when the engine
    /// is in a state that does not allow the operation.
    #[error("Socket error: {message}")]
    Socket {
        /// Description of the socket error.
        message: String,
    },

    /// Stream closed before the expected bytes arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Invalid argument passed by the caller.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Frame uses the 64-bit extended length while large frames are off.
    #[error("Unsupported frame size: {declared} bytes needs 64-bit length")]
    UnsupportedFrameSize {
        /// Payload length declared by the frame header.
        declared: u64,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// A registered event callback failed.
    #[error("Callback for '{event}' failed: {message}")]
    Callback {
        /// Event name being dispatched.
        event: String,
        /// Error reported by the callback.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a handshake status error.
    #[inline]
    pub fn handshake_status(status: u16, headers: impl Into<String>) -> Self {
        Self::HandshakeStatus {
            status,
            headers: headers.into(),
        }
    }

    /// Creates a socket error.
    #[inline]
    pub fn socket(message: impl Into<String>) -> Self {
        Self::Socket {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unsupported frame size error.
    #[inline]
    pub fn unsupported_frame_size(declared: u64) -> Self {
        Self::UnsupportedFrameSize { declared }
    }

    /// Creates a callback error.
    #[inline]
    pub fn callback(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            event: event.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the connection attempt failed during negotiation.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::HandshakeStatus { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Socket { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
