//! Envelope routing.
//!
//! The `Router` resolves an envelope's `to` field to a registered
//! connection and hands it the serialized envelope.
//!
//! # Routing Logic
//!
//! For each envelope, the router:
//! 1. Canonicalizes the destination (`to`); failure drops the envelope
//! 2. Looks the identity up in the `ConnectionRegistry`; absence drops it
//! 3. Stamps a delivery timestamp if the sender did not supply one
//! 4. Queues the serialized envelope on the recipient's handle
//!
//! Delivery is fire-and-forget. The router never retries and never removes
//! registry entries itself; a failed send is left for the owning session or
//! the sweeper to reclaim, so the router cannot race a re-registration.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::envelope::{Envelope, OutboundFrame};
use crate::error::{IdentityError, RelayError, SendError};
use crate::identity::{canonicalize, WalletId};
use crate::registry::ConnectionRegistry;
use crate::stats::RelayStats;

/// Why an envelope was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// `to` is not a valid wallet address
    InvalidDestination(IdentityError),
    /// No connection registered for the destination
    RecipientOffline(WalletId),
    /// The recipient's connection refused the frame
    DeliveryFailed(WalletId, SendError),
}

/// Result of a routing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the recipient's connection
    Delivered(WalletId),
    /// Not delivered
    Dropped(DropReason),
}

impl RouteOutcome {
    /// Whether the envelope was delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Convert into a `Result`, mapping drops onto relay errors.
    pub fn into_result(self) -> Result<WalletId, RelayError> {
        match self {
            Self::Delivered(id) => Ok(id),
            Self::Dropped(DropReason::InvalidDestination(e)) => Err(RelayError::InvalidIdentity(e)),
            Self::Dropped(DropReason::RecipientOffline(id)) => Err(RelayError::RecipientOffline(id)),
            Self::Dropped(DropReason::DeliveryFailed(to, source)) => {
                Err(RelayError::DeliveryFailed { to, source })
            }
        }
    }
}

/// Routes envelopes to registered connections.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
}

impl Router {
    /// Create a router over a shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>, stats: Arc<RelayStats>) -> Self {
        Self { registry, stats }
    }

    /// Route an envelope using the current wall clock for stamping.
    pub fn route(&self, envelope: Envelope) -> RouteOutcome {
        self.route_at(envelope, chrono::Utc::now().timestamp_millis())
    }

    /// Route an envelope, stamping with `now_millis` if it has no timestamp.
    #[instrument(skip_all, fields(kind = envelope.kind().unwrap_or("-")))]
    pub fn route_at(&self, mut envelope: Envelope, now_millis: i64) -> RouteOutcome {
        let resolved = match envelope.to() {
            Some(Value::String(raw)) => canonicalize(raw),
            _ => Err(IdentityError::NotAString),
        };
        let to = match resolved {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Dropping envelope with invalid destination");
                self.stats.record_invalid_destination();
                return RouteOutcome::Dropped(DropReason::InvalidDestination(e));
            }
        };

        let Some(recipient) = self.registry.lookup(&to) else {
            info!(to = %to, "Recipient not connected");
            self.stats.record_offline();
            return RouteOutcome::Dropped(DropReason::RecipientOffline(to));
        };

        envelope.stamp(now_millis);

        match recipient.send(OutboundFrame::Text(envelope.to_json())) {
            Ok(()) => {
                debug!(to = %to, conn = %recipient.id(), "Envelope queued for delivery");
                self.stats.record_routed();
                RouteOutcome::Delivered(to)
            }
            Err(e) => {
                warn!(to = %to, conn = %recipient.id(), error = %e, "Delivery failed");
                self.stats.record_delivery_failed();
                RouteOutcome::Dropped(DropReason::DeliveryFailed(to, e))
            }
        }
    }
}
