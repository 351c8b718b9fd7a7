//! Per-connection state for accepted consoles.
//!
//! Each accepted stream gets a `ClientConn` that owns a read task and a
//! write task on the multiplexer's runtime and translates between the
//! socket and [`MuxEvent`]s.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedSender};
use tokio::task::JoinHandle;

use super::events::MuxEvent;
use super::server::MuxOptions;
use super::ConnectionId;

/// Multiplexer-side state for a single console connection.
pub struct ClientConn {
    id: ConnectionId,
    /// Bounded queue of outgoing frames to this console.
    frame_tx: Sender<Vec<u8>>,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
    /// Cleared when the connection failed; removed at the end of a pass.
    alive: bool,
}

impl std::fmt::Debug for ClientConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConn")
            .field("id", &self.id)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}

impl ClientConn {
    /// Spawn the read and write tasks for `stream`.
    ///
    /// Must be called from within the multiplexer's runtime.
    pub(crate) fn spawn<S>(
        id: ConnectionId,
        stream: S,
        event_tx: UnboundedSender<MuxEvent>,
        options: MuxOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(options.outbound_queue_frames.max(1));

        let read_handle = tokio::spawn(Self::read_loop(
            id,
            read_half,
            event_tx.clone(),
            options.read_chunk_size.max(1),
        ));
        let write_handle = tokio::spawn(Self::write_loop(id, write_half, frame_rx, event_tx));

        Self {
            id,
            frame_tx,
            read_handle,
            write_handle,
            alive: true,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns false once the connection has failed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Queue `bytes` for the write task without waiting.
    ///
    /// Returns `false` if the write task has stopped or the queue is full.
    pub(crate) fn send(&self, bytes: Vec<u8>) -> bool {
        if !self.alive {
            return false;
        }
        match self.frame_tx.try_send(bytes) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("[Socket] Outbound queue full for {}, console is not reading", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Abort both tasks, closing the stream.
    pub(crate) fn disconnect(self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }

    /// Read loop: forwards every chunk as [`MuxEvent::Data`].
    ///
    /// EOF is treated like a read error.
    async fn read_loop<R>(
        id: ConnectionId,
        mut reader: ReadHalf<R>,
        event_tx: UnboundedSender<MuxEvent>,
        chunk_size: usize,
    ) where
        R: AsyncRead + AsyncWrite,
    {
        let mut buf = vec![0u8; chunk_size];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    log::info!("[Socket] Console disconnected: {}", id);
                    break;
                }
                Ok(n) => {
                    let event = MuxEvent::Data {
                        id,
                        bytes: buf[..n].to_vec(),
                    };
                    if event_tx.send(event).is_err() {
                        // Multiplexer dropped
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("[Socket] Read error for {}: {e}", id);
                    break;
                }
            }
        }

        let _ = event_tx.send(MuxEvent::Closed { id });
    }

    /// Write loop: writes queued frames in order.
    async fn write_loop<W>(
        id: ConnectionId,
        mut writer: WriteHalf<W>,
        mut frame_rx: Receiver<Vec<u8>>,
        event_tx: UnboundedSender<MuxEvent>,
    ) where
        W: AsyncRead + AsyncWrite,
    {
        while let Some(data) = frame_rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                log::warn!("[Socket] Write error for {}: {e}", id);
                let _ = event_tx.send(MuxEvent::Closed { id });
                return;
            }
        }
    }
}
