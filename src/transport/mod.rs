//! Handshake and stream transport.
//!
//! # Connection Lifecycle
//!
//! ```text
//! ┌─────────────────┐   GET /socket.io/1            ┌─────────────────┐
//! │  Client (Rust)  │──────────────────────────────►│  socket.io 0.9  │
//! │                 │◄──── sid:hb:ct:transports ────│  server         │
//! │                 │                               │                 │
//! │  MaybeTlsStream │── GET .../websocket/{sid} ───►│                 │
//! │                 │◄──── HTTP/1.1 101 ────────────│                 │
//! └─────────────────┘                               └─────────────────┘
//! ```
//!
//! 1. `handshake::negotiate` - HTTP GET allocating the [`Session`]
//! 2. `stream::open` - TCP (or TLS) connection to the same host
//! 3. `handshake::upgrade` - HTTP/1.1 Upgrade on the raw stream
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handshake` | Session handshake and upgrade exchange |
//! | `stream` | Plain/TLS stream and endpoint parsing |

// ============================================================================
// Submodules
// ============================================================================

/// Session handshake and WebSocket upgrade.
pub mod handshake;

/// Raw TCP/TLS stream.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use handshake::{
    HandshakeOptions, HandshakeResponse, Session, UpgradeRequest, generate_key, negotiate, upgrade,
};
pub use stream::{Endpoint, MaybeTlsStream, open};
