//! Liveness sweeper.
//!
//! Sessions remove their own registry entries on a clean close. Connections
//! that vanish without one (crash, network partition) leave an entry behind
//! whose handle reads as closed; the sweeper evicts those on a fixed
//! interval, always through the registry's guarded removal.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::ConnectionRegistry;
use crate::stats::RelayStats;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic evictor of closed connections.
#[derive(Debug, Clone)]
pub struct Sweeper {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper. Intervals below one millisecond are raised to it.
    pub fn new(registry: Arc<ConnectionRegistry>, stats: Arc<RelayStats>, interval: Duration) -> Self {
        Self {
            registry,
            stats,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep. Returns the number of evicted entries.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.sweep_closed();
        self.stats.record_sweep(evicted);
        evicted
    }

    /// Spawn the sweep loop. It runs until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs_f64(), "Liveness sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.sweep_once();
                        debug!(evicted, remaining = self.registry.size(), "Sweep complete");
                    }
                }
            }

            info!("Liveness sweeper stopped");
        })
    }
}
