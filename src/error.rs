//! Error types surfaced by the bridge library.
//!
//! Setup failures are returned to the caller before the session loop starts.
//! Everything that happens after that (per-connection I/O, protocol misuse,
//! failing user commands) is absorbed and reported as log entries instead.

use std::path::PathBuf;

use crate::codec::ValueKind;

/// Fatal errors raised while setting up or connecting a bridge.
#[derive(Debug)]
pub enum BridgeError {
    /// The listening address could not be bound (in use, not permitted, ...).
    Bind {
        /// Human-readable address that failed.
        address: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// A Unix socket path exceeds the platform `sun_path` limit.
    PathTooLong {
        /// Offending path.
        path: PathBuf,
        /// Length of the path in bytes.
        len: usize,
    },
    /// The I/O runtime could not be created.
    Runtime(std::io::Error),
    /// Connecting to a bridge failed.
    Connect {
        /// Human-readable address that failed.
        address: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// An established connection failed.
    Io(std::io::Error),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind { address, source } => write!(f, "Failed to bind {address}: {source}"),
            Self::PathTooLong { path, len } => write!(
                f,
                "Socket path too long ({len} bytes, max {}): {}",
                crate::constants::MAX_SOCKET_PATH - 1,
                path.display()
            ),
            Self::Runtime(e) => write!(f, "Failed to start I/O runtime: {e}"),
            Self::Connect { address, source } => {
                write!(f, "Failed to connect to {address}: {source}")
            }
            Self::Io(e) => write!(f, "Connection error: {e}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } | Self::Connect { source, .. } => Some(source),
            Self::Runtime(e) | Self::Io(e) => Some(e),
            Self::PathTooLong { .. } => None,
        }
    }
}

/// Failure to decode wire text into a typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Name of the type that was expected.
    pub expected: &'static str,
    /// The text that failed to decode.
    pub input: String,
}

impl CodecError {
    pub(crate) fn new(expected: &'static str, input: &str) -> Self {
        Self {
            expected,
            input: input.to_string(),
        }
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot decode {:?} as {}", self.input, self.expected)
    }
}

impl std::error::Error for CodecError {}

/// Reasons a `set` against the registry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// No writable is registered under this name.
    UnknownWritable(String),
    /// The raw value could not be decoded for the writable's type.
    InvalidValue {
        /// Writable name.
        name: String,
        /// Type the writable expects.
        kind: ValueKind,
        /// Decoder failure.
        error: CodecError,
    },
}

impl std::fmt::Display for SetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownWritable(name) => write!(f, "Unknown writable: {name}"),
            Self::InvalidValue { name, kind, error } => {
                write!(f, "Invalid value for writable {name} ({}): {error}", kind.as_str())
            }
        }
    }
}

impl std::error::Error for SetError {}
