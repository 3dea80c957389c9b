//! Relay core configuration.

use std::time::Duration;

use crate::connection::DEFAULT_OUTBOUND_CAPACITY;
use crate::sweeper::DEFAULT_SWEEP_INTERVAL;

/// Tunables for the relay core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interval between liveness sweeps
    pub sweep_interval: Duration,
    /// Per-connection outbound queue capacity
    pub outbound_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the outbound queue capacity.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}
