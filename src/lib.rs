//! Mission Control - telemetry and command bridge for embedded applications.
//!
//! A host application registers named values and commands, then ticks the
//! bridge from its main loop. Every tick, connected consoles receive a frame
//! with the current value of everything registered, and any commands they
//! sent since the last tick are executed.
//!
//! # Architecture
//!
//! - **Bridge** - Session loop, owns the registry and the multiplexer
//! - **Registry** - Readables, writables and user commands by name
//! - **Socket** - Listening endpoint and per-connection I/O tasks
//! - **Tokenizer / Dispatch** - Inbound command lines to registry calls
//! - **Codec / Protocol** - Values to wire text, wire text to frames
//!
//! # Modules
//!
//! - [`bridge`] - `MissionControl` session and fixed-rate run loop
//! - [`registry`] - Bindings and `Shared<T>` value handles
//! - [`socket`] - Unix/TCP multiplexer and frame splitting
//! - [`client`] - Blocking console client
//! - [`config`] - Configuration loading/saving

pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logbuf;
pub mod protocol;
pub mod registry;
pub mod socket;
pub mod tokenizer;

// Re-export commonly used types
pub use bridge::{run_loop, BridgeOptions, MissionControl, TickPhase};
pub use client::ConsoleClient;
pub use codec::{Value, ValueKind, WireValue};
pub use config::Config;
pub use dispatch::UnknownCommandPolicy;
pub use error::{BridgeError, CodecError, SetError};
pub use registry::{Registry, Shared};
pub use socket::{ConnectionId, Endpoint};
pub use tokenizer::CommandCall;
