//! Application-wide constants for mission-control.
//!
//! This module centralizes the wire-level byte values and the socket and
//! timing defaults so they are discoverable in one place.
//!
//! # Categories
//!
//! - **Wire**: frame and command terminators
//! - **Socket**: read sizes and path limits
//! - **Timing**: tick rate and retry delays

use std::time::Duration;

// ============================================================================
// Wire
// ============================================================================

/// Terminator appended to every outbound frame (ASCII unit separator).
pub const FRAME_TERMINATOR: u8 = 0x1F;

/// Terminator ending each inbound command line.
pub const COMMAND_TERMINATOR: u8 = b';';

/// Toggles quoted mode inside a command line.
pub const QUOTE: u8 = b'"';

// ============================================================================
// Socket
// ============================================================================

/// Default number of bytes requested per socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Default number of frames queued per console before it counts as stalled.
///
/// About two and a half seconds of updates at the default tick rate.
pub const OUTBOUND_QUEUE_FRAMES: usize = 64;

/// Conservative upper bound on a Unix socket path.
///
/// `sun_path` is 104 bytes on macOS and 108 on Linux; the smaller limit is
/// used so paths behave the same on both.
pub const MAX_SOCKET_PATH: usize = 104;

/// Default filesystem path for the listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mission-control.sock";

// ============================================================================
// Timing
// ============================================================================

/// Default number of ticks per second for the `serve` loop.
pub const DEFAULT_TICK_RATE_HZ: u32 = 24;

/// Delay before retrying after a failed `accept()`.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Read timeout used by the blocking console client.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(50);
