//! Relay counters.
//!
//! Cheap atomic counters bumped on the hot path and read by the health
//! endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for one relay instance.
#[derive(Debug, Default)]
pub struct RelayStats {
    registrations: AtomicU64,
    messages_routed: AtomicU64,
    dropped_invalid_destination: AtomicU64,
    dropped_offline: AtomicU64,
    dropped_delivery_failed: AtomicU64,
    malformed_frames: AtomicU64,
    sweeps: AtomicU64,
    swept_entries: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Successful registrations, including re-registrations
    pub registrations: u64,
    /// Envelopes queued on a recipient's connection
    pub messages_routed: u64,
    /// Envelopes whose `to` was not a wallet address
    pub dropped_invalid_destination: u64,
    /// Envelopes for identities with no registered connection
    pub dropped_offline: u64,
    /// Envelopes the recipient's connection refused
    pub dropped_delivery_failed: u64,
    /// Frames that were not JSON objects
    pub malformed_frames: u64,
    /// Completed sweep ticks
    pub sweeps: u64,
    /// Entries evicted by sweeps
    pub swept_entries: u64,
}

impl RelayStats {
    /// Create a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful registration.
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope queued for delivery.
    pub fn record_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope dropped for an invalid `to`.
    pub fn record_invalid_destination(&self) {
        self.dropped_invalid_destination
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope dropped because the recipient is not connected.
    pub fn record_offline(&self) {
        self.dropped_offline.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope the recipient's connection refused.
    pub fn record_delivery_failed(&self) {
        self.dropped_delivery_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that was not a JSON object.
    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one sweep tick and how many entries it evicted.
    pub fn record_sweep(&self, evicted: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.swept_entries
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            dropped_invalid_destination: self.dropped_invalid_destination.load(Ordering::Relaxed),
            dropped_offline: self.dropped_offline.load(Ordering::Relaxed),
            dropped_delivery_failed: self.dropped_delivery_failed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            swept_entries: self.swept_entries.load(Ordering::Relaxed),
        }
    }
}
