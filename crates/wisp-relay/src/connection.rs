//! Connection handles.
//!
//! A [`ConnectionHandle`] is the relay's view of one peer: the sending half
//! of a bounded outbound queue that a transport writer drains to the socket.
//! The writer drops the receiving half when the socket dies, which flips the
//! handle to [`ConnectionState::Closed`]. That is the signal the sweeper
//! looks for.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::envelope::OutboundFrame;
use crate::error::SendError;

/// Default outbound queue capacity per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Unique id for a connection, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport writer is alive
    Open,
    /// Transport writer is gone (closed or errored)
    Closed,
}

/// Handle to one peer's outbound queue.
///
/// Clones refer to the same connection. The registry stores clones; only the
/// owning session closes the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Create a handle together with the receiver the transport writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            sender,
        };
        (handle, receiver)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        if self.sender.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Whether the transport writer is still alive.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a frame without blocking.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(OutboundFrame::Text(text.into()))
    }

    /// Ask the transport writer to close the connection. Best effort.
    pub fn close(&self) {
        let _ = self.sender.try_send(OutboundFrame::Close);
    }

    /// Whether `other` refers to the same connection.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id && self.sender.same_channel(&other.sender)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
