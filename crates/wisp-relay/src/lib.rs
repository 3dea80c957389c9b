//! # wisp-relay
//!
//! Core of the Wisp message relay: lets parties identified by EVM wallet
//! addresses exchange events (chat, signaling, presence) over persistent
//! connections without knowing each other's network location.
//!
//! ## Architecture
//!
//! - **Identity**: raw address → canonical [`WalletId`], or rejection
//! - **Registry**: `WalletId` → the one live [`ConnectionHandle`] for it
//! - **Router**: resolves an envelope's `to` and queues it on the recipient
//! - **Session**: owns one connection; registers, routes, cleans up on close
//! - **Sweeper**: periodically evicts entries whose connection silently died
//!
//! This crate has no socket code. A transport accepts connections, calls
//! [`Relay::connect`], feeds inbound frames to [`Session::run`] and drains
//! the outbound receiver to the wire.

pub mod config;
pub mod connection;
pub mod envelope;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod routing;
pub mod session;
pub mod stats;
pub mod sweeper;

mod error;

pub use config::RelayConfig;
pub use connection::{ConnectionHandle, ConnectionId, ConnectionState};
pub use envelope::{ClientMessage, Envelope, InboundFrame, OutboundFrame, ServerMessage};
pub use error::{IdentityError, RelayError, SendError, TransportError};
pub use identity::{canonicalize, WalletId};
pub use registry::{ConnectionRegistry, Registration};
pub use relay::{HealthReport, Relay};
pub use routing::{DropReason, RouteOutcome, Router};
pub use session::{FrameOutcome, Session, SessionState, SessionSummary};
pub use stats::{RelayStats, StatsSnapshot};
pub use sweeper::Sweeper;
