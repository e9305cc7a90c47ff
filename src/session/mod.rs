//! Connected session: state machine, callbacks and keepalive loop.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `engine` | [`SessionEngine`] and the keepalive loop |
//! | `callbacks` | Per-event callback registry |
//! | `state` | [`ConnectionState`] lifecycle |

// ============================================================================
// Submodules
// ============================================================================

/// Event callback registry.
pub mod callbacks;

/// Session engine.
pub mod engine;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use callbacks::{Callback, CallbackRegistry};
pub use engine::{ConnectTarget, DisconnectHandle, EngineConfig, SessionEngine};
pub use state::ConnectionState;
