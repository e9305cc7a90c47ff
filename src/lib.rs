//! socket.io 0.9 client over a hand-rolled WebSocket transport.
//!
//! This library connects to socket.io servers that speak the 0.9-era
//! protocol: an HTTP session handshake, an HTTP/1.1 upgrade on a raw
//! TCP (or TLS) stream, then RFC 6455 text frames carrying
//! `type:id:endpoint:data` packets.
//!
//! # Architecture
//!
//! ```text
//! Client ──► negotiate (HTTP GET) ──► open stream ──► upgrade ──► SessionEngine
//!                                                                  │
//!                                            emit / send ◄─────────┤
//!                                            keep_alive  ──► callbacks
//! ```
//!
//! Key design principles:
//!
//! - One [`SessionEngine`] owns one stream; every operation takes `&mut self`
//! - Client frames are always masked with a fresh key
//! - Every send is followed by a 100 ms pause
//! - Callbacks are shared handles, deduplicated per event
//!
//! # Quick Start
//!
//! ```no_run
//! use socketio_legacy::{Callback, Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut socket = Client::new("http://localhost:3000")
//!         .of("/active")
//!         .connection(async |socket| {
//!             socket.on("message", Callback::new(|data| {
//!                 println!("message: {data}");
//!                 Ok(())
//!             }));
//!             socket.emit("sender", vec!["hello".into()]).await
//!         })
//!         .await?;
//!
//!     socket.keep_alive().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] factory and [`ClientOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Frame codec and packet format |
//! | [`session`] | [`SessionEngine`], callbacks and state |
//! | [`transport`] | Session handshake, upgrade and raw stream |

// ============================================================================
// Modules
// ============================================================================

/// Client configuration and entry point.
///
/// Use [`Client::new()`] to configure and open a connection.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire protocol types.
///
/// WebSocket frames and socket.io packets.
pub mod protocol;

/// Connected session.
///
/// State machine, callback registry and keepalive loop.
pub mod session;

/// Handshake and stream transport.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientOptions, Socket};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{EventMessage, FrameCodec, Opcode, Packet, PacketType};

// Session types
pub use session::{Callback, ConnectionState, DisconnectHandle, EngineConfig, SessionEngine};

// Transport types
pub use transport::{HandshakeResponse, MaybeTlsStream, Session};
