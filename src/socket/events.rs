//! Events sent from the I/O tasks to the multiplexer.
//!
//! The accept task and every per-connection task share one
//! `mpsc::UnboundedSender<MuxEvent>`. [`super::Multiplexer::poll_once`]
//! drains the receiver without blocking.

use super::client_conn::ClientConn;
use super::ConnectionId;

/// Event from an I/O task delivered to the multiplexer.
#[derive(Debug)]
pub(crate) enum MuxEvent {
    /// A connection was accepted and its tasks are running.
    Accepted {
        /// Handle owning the connection's tasks.
        conn: ClientConn,
    },

    /// Bytes read from a connection, in arrival order.
    Data {
        /// Source connection.
        id: ConnectionId,
        /// One read's worth of bytes.
        bytes: Vec<u8>,
    },

    /// The peer closed, or a read or write failed.
    ///
    /// May be sent by both the read and the write task of one connection.
    Closed {
        /// Connection that went away.
        id: ConnectionId,
    },
}
