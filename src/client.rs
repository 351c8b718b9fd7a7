//! Blocking console client.
//!
//! Connects to a bridge, sends command lines and reads back frames. Used by
//! the `watch` and `send` subcommands and by the integration tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use crate::constants::{CLIENT_READ_TIMEOUT, READ_CHUNK_SIZE};
use crate::error::BridgeError;
use crate::socket::framing::FrameSplitter;
use crate::socket::Endpoint;
use crate::tokenizer::CommandCall;

#[derive(Debug)]
enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Unix(s) => s.set_read_timeout(timeout),
            Self::Tcp(s) => s.set_read_timeout(timeout),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Unix(s) => s.read(buf),
            Self::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Unix(s) => s.write(buf),
            Self::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Unix(s) => s.flush(),
            Self::Tcp(s) => s.flush(),
        }
    }
}

/// A console connected to a bridge.
#[derive(Debug)]
pub struct ConsoleClient {
    stream: Stream,
    splitter: FrameSplitter,
    /// Frames already split off but not yet returned.
    pending: VecDeque<String>,
}

impl ConsoleClient {
    /// Connect to the bridge listening on `endpoint`.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, BridgeError> {
        let connect_error = |source: io::Error| BridgeError::Connect {
            address: endpoint.to_string(),
            source,
        };

        let stream = match endpoint {
            Endpoint::Unix(path) => Stream::Unix(UnixStream::connect(path).map_err(connect_error)?),
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).map_err(connect_error)?;
                stream.set_nodelay(true).map_err(connect_error)?;
                Stream::Tcp(stream)
            }
        };

        Ok(Self {
            stream,
            splitter: FrameSplitter::new(),
            pending: VecDeque::new(),
        })
    }

    /// Send one command.
    pub fn send_command(&mut self, call: &CommandCall) -> Result<(), BridgeError> {
        self.send_raw(call.to_line().as_bytes())
    }

    /// Send bytes verbatim, e.g. a partial command line.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.stream.write_all(bytes).map_err(BridgeError::Io)?;
        self.stream.flush().map_err(BridgeError::Io)
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` on timeout. A closed connection is an error.
    pub fn recv_frame(&mut self, timeout: Duration) -> Result<Option<String>, BridgeError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(CLIENT_READ_TIMEOUT).max(Duration::from_millis(1));
            self.stream
                .set_read_timeout(Some(wait))
                .map_err(BridgeError::Io)?;

            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(BridgeError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "bridge closed the connection",
                    )))
                }
                Ok(n) => self.pending.extend(self.splitter.feed(&buf[..n])),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
    }

    /// Wait up to `timeout` for the next frame, parsed as JSON.
    pub fn recv_message(&mut self, timeout: Duration) -> Result<Option<serde_json::Value>, BridgeError> {
        let Some(frame) = self.recv_frame(timeout)? else {
            return Ok(None);
        };
        serde_json::from_str(&frame)
            .map(Some)
            .map_err(|e| BridgeError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Wait up to `timeout` for a frame accepted by `matches`.
    ///
    /// Frames that do not match are discarded.
    pub fn recv_until(
        &mut self,
        timeout: Duration,
        mut matches: impl FnMut(&serde_json::Value) -> bool,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_message(remaining)? {
                Some(message) if matches(&message) => return Ok(Some(message)),
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }
}
