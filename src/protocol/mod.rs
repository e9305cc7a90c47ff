//! Wire protocol: WebSocket frames and socket.io packets.
//!
//! # Protocol Overview
//!
//! | Layer | Format | Direction |
//! |-------|--------|-----------|
//! | Frame | RFC 6455 header + optional mask + payload | both |
//! | Packet | `type:id:endpoint:data` inside a text frame | both |
//! | Event | `{"name": ..., "args": [...]}` in packet data | both |
//!
//! Client frames are masked; server frames are read unmasked.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame codec and masking |
//! | `packet` | Packet types and event body |

// ============================================================================
// Submodules
// ============================================================================

/// RFC 6455 frame codec.
pub mod frame;

/// socket.io packet multiplexing.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, FrameCodec, Opcode, apply_mask, mask_data};
pub use packet::{EventMessage, Packet, PacketType};
