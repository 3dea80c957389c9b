//! Error types for the relay core.
//!
//! None of these are fatal to the process. Sessions and the router handle
//! them locally and log them; peers never receive diagnostic feedback.

use thiserror::Error;

use crate::identity::WalletId;

/// Relay errors surfaced while processing a single frame or session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Wallet address failed canonicalization
    #[error("Invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// Destination identity is not present in the registry
    #[error("Recipient offline: {0}")]
    RecipientOffline(WalletId),

    /// Destination resolved but its connection rejected the frame
    #[error("Delivery to {to} failed: {source}")]
    DeliveryFailed {
        /// Resolved recipient
        to: WalletId,
        /// Why the handle refused the frame
        source: SendError,
    },

    /// Inbound frame is not a well-formed JSON object
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RelayError {
    /// Create a new malformed frame error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }
}

/// Reasons a wallet address cannot be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Empty input
    #[error("address is empty")]
    Empty,

    /// Address field is present but not a JSON string
    #[error("address is not a string")]
    NotAString,

    /// Wrong number of hex digits
    #[error("address must have 40 hex digits, got {0}")]
    InvalidLength(usize),

    /// Non-hex character in the address body
    #[error("address contains non-hex character {0:?}")]
    InvalidCharacter(char),

    /// Mixed-case address whose casing disagrees with EIP-55
    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

/// Failure to enqueue a frame on a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport side of the connection is gone
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full (backpressure)
    #[error("outbound queue full")]
    Full,
}

/// Error reported by the transport feeding a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Create a new transport error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
