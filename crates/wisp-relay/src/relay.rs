//! Relay facade.
//!
//! Bundles the shared registry, router and counters so a transport only has
//! to hold one value and ask it for sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::connection::ConnectionHandle;
use crate::envelope::OutboundFrame;
use crate::registry::ConnectionRegistry;
use crate::routing::Router;
use crate::session::Session;
use crate::stats::{RelayStats, StatsSnapshot};
use crate::sweeper::Sweeper;

/// Liveness report for the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    /// Registered identities
    pub connected_clients: usize,
    /// When the report was taken
    pub timestamp: DateTime<Utc>,
}

/// A relay instance.
#[derive(Debug, Clone)]
pub struct Relay {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    router: Router,
    stats: Arc<RelayStats>,
}

impl Relay {
    /// Create a relay with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&stats));
        Self {
            config,
            registry,
            router,
            stats,
        }
    }

    /// Shared registry of live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Open a session for a newly accepted connection.
    ///
    /// The returned receiver must be drained to the socket by the transport.
    pub fn connect(&self) -> (Session, mpsc::Receiver<OutboundFrame>) {
        let (handle, outbound) = ConnectionHandle::channel(self.config.outbound_capacity);
        let session = Session::new(
            Arc::clone(&self.registry),
            self.router.clone(),
            Arc::clone(&self.stats),
            handle,
        );
        (session, outbound)
    }

    /// Build the liveness sweeper for this relay.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            self.config.sweep_interval,
        )
    }

    /// Liveness report for the health endpoint.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            connected_clients: self.registry.size(),
            timestamp: Utc::now(),
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
