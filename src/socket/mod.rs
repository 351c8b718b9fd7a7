//! Stream-socket transport between the bridge and its consoles.
//!
//! # Architecture
//!
//! ```text
//! Application thread                      I/O runtime (1 worker)
//! ┌──────────────────────┐               ┌──────────────────────┐
//! │ Multiplexer          │               │ accept task          │
//! │  poll_once()  ◄──────┼── MuxEvent ───┤ read task / conn     │
//! │  broadcast()  ───────┼── Vec<u8> ───►│ write task / conn    │
//! └──────────────────────┘               └──────────────────────┘
//! ```
//!
//! The application never blocks on a socket: I/O happens on the
//! multiplexer's own runtime, and [`Multiplexer::poll_once`] only drains
//! what the tasks have already produced.
//!
//! # Wire Protocol
//!
//! Inbound: text commands terminated by `;` (see [`crate::tokenizer`]).
//! Outbound: JSON frames terminated by `0x1F` (see [`framing`]).

pub(crate) mod client_conn;
pub(crate) mod events;
pub mod framing;
pub mod server;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use server::{Multiplexer, MuxOptions, PollOutcome};

/// Address a bridge listens on or a console connects to.
///
/// Serialized as `{"unix": "/path"}` or `{"tcp": "127.0.0.1:5555"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Filesystem path of a Unix domain socket.
    Unix(PathBuf),
    /// TCP address.
    Tcp(SocketAddr),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from(crate::constants::DEFAULT_SOCKET_PATH))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Identifier of one accepted connection.
///
/// Assigned in accept order and never reused by the same multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}
