//! Client configuration and connection entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Fluent connection factory |
//! | [`ClientOptions`] | Every connection knob |
//! | [`Socket`] | Connected engine over a network stream |

// ============================================================================
// Submodules
// ============================================================================

/// Client entry point.
pub mod core;

/// Client configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Client, Socket};
pub use options::ClientOptions;
