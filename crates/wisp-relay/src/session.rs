//! Per-connection session handling.
//!
//! A [`Session`] owns one connection for its whole life. It consumes the
//! inbound frames strictly in arrival order, registers the connection when
//! the client claims a wallet address, hands addressed envelopes to the
//! [`Router`], and removes its registry entries when the transport goes away.
//!
//! ```text
//!              register (valid)            close / error / end of stream
//! Connected ───────────────────> Registered ─────────────────────────> Terminated
//!     │  ▲ routed, malformed,        │ ▲ register, routed,
//!     └──┘ invalid register          └─┘ malformed
//! ```
//!
//! Nothing a peer sends can make the session reply with an error. Invalid
//! input is logged and dropped.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::envelope::{ClientMessage, InboundFrame, OutboundFrame, ServerMessage};
use crate::error::{RelayError, TransportError};
use crate::identity::{canonicalize, WalletId};
use crate::registry::ConnectionRegistry;
use crate::routing::Router;
use crate::stats::RelayStats;

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, no identity bound
    Connected,
    /// Identity bound and registered
    Registered(WalletId),
    /// Transport is gone; final
    Terminated,
}

/// What handling one frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Connection registered under this identity and acknowledged
    Registered(WalletId),
    /// Envelope delivered to this identity
    Routed(WalletId),
    /// Ping answered
    Ponged,
    /// Well-formed frame with nothing to act on
    Ignored,
    /// Peer asked to close
    Close,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Connection the session owned
    pub connection_id: ConnectionId,
    /// Identity bound at termination, if any
    pub identity: Option<WalletId>,
    /// Inbound frames processed
    pub frames_received: u64,
    /// Envelopes successfully routed
    pub frames_routed: u64,
}

/// One connection's session.
pub struct Session {
    registry: Arc<ConnectionRegistry>,
    router: Router,
    stats: Arc<RelayStats>,
    handle: ConnectionHandle,
    state: SessionState,
    /// Identities this session registered before switching to the current one
    previous: Vec<WalletId>,
    frames_received: u64,
    frames_routed: u64,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Router,
        stats: Arc<RelayStats>,
        handle: ConnectionHandle,
    ) -> Self {
        Self {
            registry,
            router,
            stats,
            handle,
            state: SessionState::Connected,
            previous: Vec::new(),
            frames_received: 0,
            frames_routed: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Identity currently bound, if any.
    pub fn identity(&self) -> Option<&WalletId> {
        match &self.state {
            SessionState::Registered(id) => Some(id),
            _ => None,
        }
    }

    /// The connection this session owns.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Drive the session until the inbound stream closes or errors.
    #[instrument(skip_all, fields(conn = %self.handle.id()))]
    pub async fn run<S>(mut self, inbound: S) -> SessionSummary
    where
        S: Stream<Item = Result<InboundFrame, TransportError>>,
    {
        info!("Session started");
        let mut inbound = std::pin::pin!(inbound);

        while let Some(item) = inbound.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    let err = RelayError::from(e);
                    warn!(error = %err, "Transport failed, terminating session");
                    break;
                }
            };

            match self.handle_frame(frame) {
                Ok(FrameOutcome::Close) => {
                    debug!("Peer requested close");
                    break;
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Frame dropped"),
            }
        }

        self.terminate();
        self.summary()
    }

    /// Process a single inbound frame.
    ///
    /// Errors are informational; the session stays in its current state.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Result<FrameOutcome, RelayError> {
        if self.state == SessionState::Terminated {
            debug!("Frame received after termination, ignoring");
            return Ok(FrameOutcome::Ignored);
        }
        self.frames_received += 1;

        let parsed = match frame {
            InboundFrame::Text(text) => ClientMessage::parse(&text),
            InboundFrame::Binary(bytes) => ClientMessage::parse_bytes(&bytes),
            InboundFrame::Ping(payload) => {
                if let Err(e) = self.handle.send(OutboundFrame::Pong(payload)) {
                    debug!(error = %e, "Failed to queue pong");
                }
                return Ok(FrameOutcome::Ponged);
            }
            InboundFrame::Close => return Ok(FrameOutcome::Close),
        };

        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Invalid JSON frame");
                self.stats.record_malformed();
                return Err(e);
            }
        };

        match message {
            ClientMessage::Register { wallet_address } => self.register(&wallet_address),
            ClientMessage::Routed(envelope) => {
                let to = self.router.route(envelope).into_result()?;
                self.frames_routed += 1;
                Ok(FrameOutcome::Routed(to))
            }
            ClientMessage::Unroutable => {
                debug!("Ignoring frame without register or destination");
                Ok(FrameOutcome::Ignored)
            }
        }
    }

    fn register(&mut self, wallet_address: &str) -> Result<FrameOutcome, RelayError> {
        let id = canonicalize(wallet_address).map_err(|e| {
            warn!(address = %wallet_address, error = %e, "Invalid address");
            RelayError::from(e)
        })?;

        self.registry.register(id.clone(), self.handle.clone());
        self.stats.record_registration();

        if let SessionState::Registered(current) = &self.state {
            if *current != id {
                info!(previous = %current, id = %id, "Session switched identity");
                self.previous.push(current.clone());
            }
        }
        self.previous.retain(|p| *p != id);
        self.state = SessionState::Registered(id.clone());
        info!(id = %id, address = %id.to_checksummed(), "Registered");

        let ack = ServerMessage::Registered {
            wallet_address: id.clone(),
        };
        if let Err(e) = self.handle.send_text(ack.to_json()) {
            warn!(error = %e, "Failed to queue registration acknowledgement");
        }

        Ok(FrameOutcome::Registered(id))
    }

    /// Enter the terminal state: drop registry entries this session still
    /// owns and close the connection.
    pub fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }

        let bound = match std::mem::replace(&mut self.state, SessionState::Terminated) {
            SessionState::Registered(id) => Some(id),
            _ => None,
        };
        for id in self.previous.iter().chain(bound.iter()) {
            if self.registry.remove(id, &self.handle) {
                info!(id = %id, "Disconnected");
            }
        }
        if let Some(id) = bound {
            self.previous.push(id);
        }

        self.handle.close();
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            connection_id: self.handle.id(),
            identity: self.previous.last().cloned(),
            frames_received: self.frames_received,
            frames_routed: self.frames_routed,
        }
    }
}
