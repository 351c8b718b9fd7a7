//! Listening endpoint and live connection set.
//!
//! [`Multiplexer`] binds a Unix or TCP listener on its own single-worker
//! tokio runtime and spawns an accept loop that creates a [`ClientConn`] for
//! each console. The application drives it from its own thread with
//! [`Multiplexer::poll_once`], which never blocks.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use tokio::net::{TcpListener, UnixListener};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::client_conn::ClientConn;
use super::events::MuxEvent;
use super::{ConnectionId, Endpoint};
use crate::constants::{ACCEPT_RETRY_DELAY, MAX_SOCKET_PATH, OUTBOUND_QUEUE_FRAMES, READ_CHUNK_SIZE};
use crate::error::BridgeError;

/// Tuning knobs for a [`Multiplexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxOptions {
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Connections beyond this many are closed as soon as they are accepted.
    pub max_connections: Option<usize>,
    /// Frames queued per connection; a console whose queue is full is dropped.
    pub outbound_queue_frames: usize,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: READ_CHUNK_SIZE,
            max_connections: None,
            outbound_queue_frames: OUTBOUND_QUEUE_FRAMES,
        }
    }
}

/// Everything that happened during one [`Multiplexer::poll_once`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Connections accepted this pass, in accept order.
    pub accepted: Vec<ConnectionId>,
    /// Bytes read this pass, in arrival order.
    pub chunks: Vec<(ConnectionId, Vec<u8>)>,
    /// Connections removed from the live set this pass.
    pub closed: Vec<ConnectionId>,
}

impl PollOutcome {
    /// Returns true if nothing happened.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.chunks.is_empty() && self.closed.is_empty()
    }
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// One listening endpoint plus every connection accepted on it.
pub struct Multiplexer {
    /// Bound address (TCP port resolved if 0 was requested).
    endpoint: Endpoint,
    options: MuxOptions,
    event_rx: UnboundedReceiver<MuxEvent>,
    connections: Vec<ClientConn>,
    accept_handle: JoinHandle<()>,
    /// Hosts the I/O tasks. Dropped last, which stops them.
    _runtime: Runtime,
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl Multiplexer {
    /// Bind `endpoint` and start accepting connections.
    ///
    /// For a Unix path, an existing socket file that still accepts
    /// connections is reported as in use; a stale one is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Runtime`] if the I/O runtime cannot start,
    /// [`BridgeError::PathTooLong`] for an oversized socket path, and
    /// [`BridgeError::Bind`] if the address is unavailable.
    pub fn start_listening(endpoint: &Endpoint, options: MuxOptions) -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mission-control-io")
            .enable_all()
            .build()
            .map_err(BridgeError::Runtime)?;

        let (listener, endpoint) = {
            // Listeners register with the runtime's reactor
            let _guard = runtime.enter();
            match endpoint {
                Endpoint::Unix(path) => (Listener::Unix(bind_unix(path)?), endpoint.clone()),
                Endpoint::Tcp(addr) => {
                    let (listener, local) = bind_tcp(*addr)?;
                    (Listener::Tcp(listener), Endpoint::Tcp(local))
                }
            }
        };

        log::info!("[Socket] Listening on {}", endpoint);

        let (event_tx, event_rx) = mpsc::unbounded_channel::<MuxEvent>();
        let accept_handle = runtime.spawn(accept_loop(listener, event_tx, options));

        Ok(Self {
            endpoint,
            options,
            event_rx,
            connections: Vec::new(),
            accept_handle,
            _runtime: runtime,
        })
    }

    /// Collect everything the I/O tasks produced since the last pass.
    ///
    /// Connections that closed are removed at the end of the pass, after all
    /// events have been handled.
    pub fn poll_once(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        loop {
            match self.event_rx.try_recv() {
                Ok(event) => self.handle_event(event, &mut outcome),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::error!("[Socket] Accept loop has stopped");
                    break;
                }
            }
        }

        self.remove_dead(&mut outcome);
        outcome
    }

    fn handle_event(&mut self, event: MuxEvent, outcome: &mut PollOutcome) {
        match event {
            MuxEvent::Accepted { conn } => {
                if let Some(max) = self.options.max_connections {
                    if self.connection_count() >= max {
                        log::warn!(
                            "[Socket] Connection limit ({}) reached, closing {}",
                            max,
                            conn.id()
                        );
                        conn.disconnect();
                        return;
                    }
                }
                outcome.accepted.push(conn.id());
                self.connections.push(conn);
            }
            MuxEvent::Data { id, bytes } => {
                if self.live(id).is_some() {
                    outcome.chunks.push((id, bytes));
                }
            }
            MuxEvent::Closed { id } => {
                if let Some(conn) = self.connections.iter_mut().find(|c| c.id() == id) {
                    conn.mark_dead();
                }
            }
        }
    }

    fn remove_dead(&mut self, outcome: &mut PollOutcome) {
        if self.connections.iter().all(ClientConn::is_alive) {
            return;
        }
        for conn in std::mem::take(&mut self.connections) {
            if conn.is_alive() {
                self.connections.push(conn);
            } else {
                log::debug!("[Socket] Removing {}", conn.id());
                outcome.closed.push(conn.id());
                conn.disconnect();
            }
        }
    }

    fn live(&self, id: ConnectionId) -> Option<&ClientConn> {
        self.connections
            .iter()
            .find(|c| c.id() == id && c.is_alive())
    }

    /// Queue `message` to every live connection.
    ///
    /// A connection whose write task has stopped, or whose queue is full
    /// because the console stopped reading, is marked dead and removed on the
    /// next pass. Returns the number of connections it was queued to.
    pub fn broadcast(&mut self, message: &[u8]) -> usize {
        let mut queued = 0;
        for conn in self.connections.iter_mut().filter(|c| c.is_alive()) {
            if conn.send(message.to_vec()) {
                queued += 1;
            } else {
                log::info!("[Socket] Dropping {} after failed send", conn.id());
                conn.mark_dead();
            }
        }
        queued
    }

    /// Queue `message` to one connection. Returns false if it is not live.
    pub fn send_to(&mut self, id: ConnectionId, message: &[u8]) -> bool {
        let Some(conn) = self
            .connections
            .iter_mut()
            .find(|c| c.id() == id && c.is_alive())
        else {
            return false;
        };
        if conn.send(message.to_vec()) {
            true
        } else {
            conn.mark_dead();
            false
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_alive()).count()
    }

    /// The bound address.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.accept_handle.abort();
        for conn in self.connections.drain(..) {
            conn.disconnect();
        }
        if let Endpoint::Unix(path) = &self.endpoint {
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("[Socket] Could not remove {}: {e}", path.display());
            }
        }
        log::info!("[Socket] Stopped listening on {}", self.endpoint);
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, BridgeError> {
    let address = path.display().to_string();
    let bind_error = |source: io::Error| BridgeError::Bind {
        address: address.clone(),
        source,
    };

    let len = path.as_os_str().len();
    if len >= MAX_SOCKET_PATH {
        return Err(BridgeError::PathTooLong {
            path: path.to_path_buf(),
            len,
        });
    }

    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(bind_error(io::Error::new(
                io::ErrorKind::AddrInUse,
                "another process is listening on this socket",
            )));
        }
        log::info!("[Socket] Removing stale socket {}", path.display());
        std::fs::remove_file(path).map_err(bind_error)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(bind_error)?;
    }

    let listener = std::os::unix::net::UnixListener::bind(path).map_err(bind_error)?;

    // Owner-only access
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms).map_err(bind_error)?;
    }

    listener.set_nonblocking(true).map_err(bind_error)?;
    UnixListener::from_std(listener).map_err(bind_error)
}

fn bind_tcp(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), BridgeError> {
    let bind_error = |source: io::Error| BridgeError::Bind {
        address: addr.to_string(),
        source,
    };

    let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
    let local = listener.local_addr().map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    let listener = TcpListener::from_std(listener).map_err(bind_error)?;
    Ok((listener, local))
}

/// Accept loop, runs as a tokio task until aborted.
async fn accept_loop(
    listener: Listener,
    event_tx: UnboundedSender<MuxEvent>,
    options: MuxOptions,
) {
    let mut next_id = 0_u64;

    loop {
        let id = ConnectionId(next_id);
        let accepted = match &listener {
            Listener::Unix(l) => l.accept().await.map(|(stream, _addr)| {
                ClientConn::spawn(id, stream, event_tx.clone(), options)
            }),
            Listener::Tcp(l) => l.accept().await.map(|(stream, peer)| {
                log::debug!("[Socket] TCP peer {} is {}", id, peer);
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("[Socket] Could not set TCP_NODELAY: {e}");
                }
                ClientConn::spawn(id, stream, event_tx.clone(), options)
            }),
        };

        match accepted {
            Ok(conn) => {
                next_id += 1;
                log::info!("[Socket] Console connected: {}", id);
                // The runtime has one worker, so this is queued before the
                // new read task can produce anything.
                if event_tx.send(MuxEvent::Accepted { conn }).is_err() {
                    log::warn!("[Socket] Multiplexer gone, stopping accept loop");
                    break;
                }
            }
            Err(e) => {
                log::error!("[Socket] Accept error: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_TERMINATOR;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn poll_for(mux: &mut Multiplexer, mut until: impl FnMut(&PollOutcome) -> bool) -> PollOutcome {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut total = PollOutcome::default();
        while Instant::now() < deadline {
            let outcome = mux.poll_once();
            total.accepted.extend(outcome.accepted);
            total.chunks.extend(outcome.chunks);
            total.closed.extend(outcome.closed);
            if until(&total) {
                return total;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("Timed out polling, got: {total:?}");
    }

    fn unix_mux(tmp: &tempfile::TempDir) -> (Multiplexer, PathBuf) {
        let path = tmp.path().join("mc.sock");
        let mux = Multiplexer::start_listening(&Endpoint::Unix(path.clone()), MuxOptions::default())
            .unwrap();
        (mux, path)
    }

    fn read_frame(stream: &mut UnixStream) -> Vec<u8> {
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        while !received.contains(&FRAME_TERMINATOR) {
            let n = stream.read(&mut buf).expect("Read failed");
            assert!(n > 0, "Unexpected EOF");
            received.extend_from_slice(&buf[..n]);
        }
        received
    }

    #[test]
    fn test_accepts_connection_and_reads_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let mut client = UnixStream::connect(&path).unwrap();
        let outcome = poll_for(&mut mux, |o| !o.accepted.is_empty());
        let id = outcome.accepted[0];
        assert_eq!(mux.connection_count(), 1);

        client.write_all(b"set throttle 1;").unwrap();
        let outcome = poll_for(&mut mux, |o| {
            o.chunks.iter().map(|(_, b)| b.len()).sum::<usize>() >= 15
        });
        let bytes: Vec<u8> = outcome
            .chunks
            .iter()
            .inspect(|(from, _)| assert_eq!(*from, id))
            .flat_map(|(_, b)| b.clone())
            .collect();
        assert_eq!(bytes, b"set throttle 1;");
    }

    #[test]
    fn test_broadcast_reaches_client() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let mut client = UnixStream::connect(&path).unwrap();
        poll_for(&mut mux, |o| !o.accepted.is_empty());

        assert_eq!(mux.broadcast(b"hello\x1f"), 1);
        assert_eq!(read_frame(&mut client), b"hello\x1f");
    }

    #[test]
    fn test_send_to_targets_one_connection() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let mut first = UnixStream::connect(&path).unwrap();
        let outcome = poll_for(&mut mux, |o| o.accepted.len() == 1);
        let first_id = outcome.accepted[0];
        let mut second = UnixStream::connect(&path).unwrap();
        poll_for(&mut mux, |o| o.accepted.len() == 1);

        assert!(mux.send_to(first_id, b"only-you\x1f"));
        assert!(mux.send_to(first_id, b"again\x1f"));
        assert_eq!(read_frame(&mut first), b"only-you\x1f");

        second
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut buf = [0u8; 16];
        assert!(second.read(&mut buf).is_err(), "Second client should get nothing");

        assert!(!mux.send_to(ConnectionId(999), b"nobody\x1f"));
    }

    #[test]
    fn test_closed_client_is_removed_at_end_of_pass() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let client = UnixStream::connect(&path).unwrap();
        let id = poll_for(&mut mux, |o| !o.accepted.is_empty()).accepted[0];

        drop(client);
        let outcome = poll_for(&mut mux, |o| !o.closed.is_empty());
        assert_eq!(outcome.closed, vec![id]);
        assert_eq!(mux.connection_count(), 0);
        assert_eq!(mux.broadcast(b"x\x1f"), 0);
    }

    #[test]
    fn test_surviving_client_keeps_receiving() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let first = UnixStream::connect(&path).unwrap();
        let mut second = UnixStream::connect(&path).unwrap();
        poll_for(&mut mux, |o| o.accepted.len() == 2);

        drop(first);
        poll_for(&mut mux, |o| !o.closed.is_empty());

        assert_eq!(mux.broadcast(b"still here\x1f"), 1);
        assert_eq!(read_frame(&mut second), b"still here\x1f");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, path) = unix_mux(&tmp);

        let _a = UnixStream::connect(&path).unwrap();
        let _b = UnixStream::connect(&path).unwrap();
        let _c = UnixStream::connect(&path).unwrap();
        let outcome = poll_for(&mut mux, |o| o.accepted.len() == 3);

        let unique: std::collections::HashSet<_> = outcome.accepted.iter().collect();
        assert_eq!(unique.len(), 3, "IDs should be unique, got: {:?}", outcome.accepted);
        assert_eq!(mux.connection_count(), 3);
    }

    #[test]
    fn test_connection_limit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mc.sock");
        let options = MuxOptions {
            max_connections: Some(1),
            ..MuxOptions::default()
        };
        let mut mux = Multiplexer::start_listening(&Endpoint::Unix(path.clone()), options).unwrap();

        let _a = UnixStream::connect(&path).unwrap();
        let _b = UnixStream::connect(&path).unwrap();
        let outcome = poll_for(&mut mux, |o| !o.accepted.is_empty());

        // Give the second accept time to arrive and be rejected
        std::thread::sleep(Duration::from_millis(100));
        let later = mux.poll_once();
        assert_eq!(outcome.accepted.len() + later.accepted.len(), 1);
        assert_eq!(mux.connection_count(), 1);
    }

    #[test]
    fn test_console_that_stops_reading_is_dropped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mc.sock");
        let options = MuxOptions {
            outbound_queue_frames: 4,
            ..MuxOptions::default()
        };
        let mut mux = Multiplexer::start_listening(&Endpoint::Unix(path.clone()), options).unwrap();

        let _stalled = UnixStream::connect(&path).unwrap();
        let outcome = poll_for(&mut mux, |o| o.accepted.len() == 1);
        let stalled_id = outcome.accepted[0];

        let mut healthy = UnixStream::connect(&path).unwrap();
        poll_for(&mut mux, |o| o.accepted.len() == 1);
        std::thread::spawn(move || {
            let mut sink = vec![0u8; 64 * 1024];
            while matches!(healthy.read(&mut sink), Ok(n) if n > 0) {}
        });

        let frame = vec![b'x'; 1024 * 1024];
        let mut sends = 0;
        while mux.connection_count() == 2 {
            assert!(sends < 64, "Stalled console was never dropped");
            mux.broadcast(&frame);
            sends += 1;
            std::thread::sleep(Duration::from_millis(20));
        }

        let outcome = poll_for(&mut mux, |o| !o.closed.is_empty());
        assert_eq!(outcome.closed, vec![stalled_id]);
        assert_eq!(mux.connection_count(), 1);
    }

    #[test]
    fn test_poll_without_activity_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut mux, _path) = unix_mux(&tmp);
        assert!(mux.poll_once().is_empty());
    }

    #[test]
    fn test_socket_path_length_validation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sock_path = tmp.path().join("a".repeat(200)).join("test.sock");

        match Multiplexer::start_listening(&Endpoint::Unix(sock_path), MuxOptions::default()) {
            Err(BridgeError::PathTooLong { len, .. }) => assert!(len > MAX_SOCKET_PATH),
            other => panic!("Expected PathTooLong, got: {other:?}"),
        }
    }

    #[test]
    fn test_stale_socket_file_is_replaced() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mc.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let mut mux =
            Multiplexer::start_listening(&Endpoint::Unix(path.clone()), MuxOptions::default())
                .unwrap();
        let _client = UnixStream::connect(&path).unwrap();
        poll_for(&mut mux, |o| !o.accepted.is_empty());
    }

    #[test]
    fn test_live_socket_is_in_use() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (_mux, path) = unix_mux(&tmp);

        match Multiplexer::start_listening(&Endpoint::Unix(path), MuxOptions::default()) {
            Err(BridgeError::Bind { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("Expected Bind error, got: {other:?}"),
        }
    }

    #[test]
    fn test_drop_removes_socket_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mux, path) = unix_mux(&tmp);
        assert!(path.exists());
        drop(mux);
        assert!(!path.exists());
    }

    #[test]
    fn test_tcp_ephemeral_port_and_conflict() {
        let endpoint = Endpoint::Tcp("127.0.0.1:0".parse().unwrap());
        let mut mux = Multiplexer::start_listening(&endpoint, MuxOptions::default()).unwrap();

        let Endpoint::Tcp(bound) = mux.local_endpoint().clone() else {
            panic!("Expected TCP endpoint");
        };
        assert_ne!(bound.port(), 0);

        let mut client = std::net::TcpStream::connect(bound).unwrap();
        poll_for(&mut mux, |o| !o.accepted.is_empty());
        client.write_all(b"advertise;").unwrap();
        poll_for(&mut mux, |o| !o.chunks.is_empty());

        match Multiplexer::start_listening(&Endpoint::Tcp(bound), MuxOptions::default()) {
            Err(BridgeError::Bind { address, .. }) => assert_eq!(address, bound.to_string()),
            other => panic!("Expected Bind error, got: {other:?}"),
        }
    }
}
