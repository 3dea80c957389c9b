//! Connection Registry implementation.
//!
//! Tracks the live connection for each wallet identity.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::connection::ConnectionHandle;
use crate::identity::WalletId;

/// What a call to [`ConnectionRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No previous entry for this identity
    New,
    /// A different connection was registered and has been superseded
    Replaced,
    /// The same connection re-registered the same identity
    Unchanged,
}

/// Registry mapping wallet identities to live connections.
///
/// Thread-safe; uses DashMap so registration, lookup and guarded removal
/// on one identity are atomic with respect to each other without a global
/// lock.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a client registers:
/// let (handle, rx) = ConnectionHandle::channel(256);
/// registry.register(wallet_id.clone(), handle.clone());
///
/// // When routing a message:
/// if let Some(recipient) = registry.lookup(&wallet_id) { /* send */ }
///
/// // When the session closes:
/// registry.remove(&wallet_id, &handle);
/// ```
pub struct ConnectionRegistry {
    /// Map of canonical identity to the connection registered under it
    connections: DashMap<WalletId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create a new connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection under an identity.
    ///
    /// If another connection is already registered for `id` it is replaced.
    /// The superseded handle is left untouched: its session still owns it
    /// and may keep using it.
    #[instrument(skip(self, handle), fields(id = %id, conn = %handle.id()))]
    pub fn register(&self, id: WalletId, handle: ConnectionHandle) -> Registration {
        match self.connections.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().same_connection(&handle) {
                    debug!("Connection re-registered");
                    Registration::Unchanged
                } else {
                    let previous = entry.insert(handle);
                    debug!(previous = %previous.id(), "Replaced existing connection registration");
                    Registration::Replaced
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
                debug!("Registered new connection");
                Registration::New
            }
        }
    }

    /// Look up the connection registered for an identity.
    ///
    /// `None` means the recipient is offline; that is an expected outcome.
    pub fn lookup(&self, id: &WalletId) -> Option<ConnectionHandle> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Remove the entry for `id`, but only if it still points at `handle`.
    ///
    /// Returns true if an entry was removed.
    #[instrument(skip(self, handle), fields(id = %id, conn = %handle.id()))]
    pub fn remove(&self, id: &WalletId, handle: &ConnectionHandle) -> bool {
        let removed = self
            .connections
            .remove_if(id, |_, current| current.same_connection(handle));
        if removed.is_some() {
            debug!("Unregistered connection");
            true
        } else {
            debug!("Connection was not registered or has been superseded");
            false
        }
    }

    /// Best-effort copy of every entry.
    ///
    /// Not a point-in-time view: entries may change while it is taken.
    pub fn snapshot(&self) -> Vec<(WalletId, ConnectionHandle)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Get the number of registered identities.
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Check if an identity is currently registered.
    pub fn is_connected(&self, id: &WalletId) -> bool {
        self.connections.contains_key(id)
    }

    /// Remove every entry whose connection has closed.
    ///
    /// Works from a snapshot and removes through the guarded path, so a
    /// newer handle installed for the same identity mid-sweep survives.
    pub fn sweep_closed(&self) -> usize {
        let stale: Vec<(WalletId, ConnectionHandle)> = self
            .snapshot()
            .into_iter()
            .filter(|(_, handle)| !handle.is_open())
            .collect();

        let mut removed = 0;
        for (id, handle) in stale {
            if self.remove(&id, &handle) {
                info!(id = %id, conn = %handle.id(), "Swept closed connection");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Cleaned up closed connections");
        }

        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::identity::canonicalize;

    fn test_id(n: u8) -> WalletId {
        canonicalize(&format!("0x{}", hex::encode([n; 20]))).unwrap()
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_register_connection() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);
        let (handle, _rx) = ConnectionHandle::channel(16);

        assert_eq!(registry.register(id.clone(), handle), Registration::New);

        assert!(registry.is_connected(&id));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_register_replaces_existing() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);

        let (h1, _rx1) = ConnectionHandle::channel(16);
        let (h2, _rx2) = ConnectionHandle::channel(16);

        registry.register(id.clone(), h1.clone());
        assert_eq!(registry.register(id.clone(), h2.clone()), Registration::Replaced);

        assert_eq!(registry.size(), 1);
        let current = registry.lookup(&id).unwrap();
        assert!(current.same_connection(&h2));
        // The superseded handle is not closed by the registry
        assert!(h1.is_open());
    }

    #[test]
    fn test_reregister_same_handle_is_unchanged() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);
        let (handle, _rx) = ConnectionHandle::channel(16);

        registry.register(id.clone(), handle.clone());
        assert_eq!(registry.register(id, handle), Registration::Unchanged);
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_guarded_remove() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);
        let (h1, _rx1) = ConnectionHandle::channel(16);
        let (h2, _rx2) = ConnectionHandle::channel(16);

        registry.register(id.clone(), h1.clone());
        registry.register(id.clone(), h2.clone());

        // The stale handle must not remove the newer entry
        assert!(!registry.remove(&id, &h1));
        assert!(registry.lookup(&id).unwrap().same_connection(&h2));

        assert!(registry.remove(&id, &h2));
        assert!(registry.lookup(&id).is_none());
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_remove_nonexistent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(16);
        assert!(!registry.remove(&test_id(9), &handle));
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup(&test_id(2)).is_none());
    }

    #[test]
    fn test_snapshot_lists_every_entry() {
        let registry = ConnectionRegistry::new();

        let id1 = test_id(1);
        let id2 = test_id(2);

        let (h1, _rx1) = ConnectionHandle::channel(16);
        let (h2, _rx2) = ConnectionHandle::channel(16);

        registry.register(id1.clone(), h1);
        registry.register(id2.clone(), h2);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|(id, _)| *id == id1));
        assert!(snapshot.iter().any(|(id, _)| *id == id2));
    }

    #[test]
    fn test_sweep_closed() {
        let registry = ConnectionRegistry::new();
        let dead = test_id(1);
        let alive = test_id(2);
        let (h_dead, rx_dead) = ConnectionHandle::channel(16);
        let (h_alive, _rx_alive) = ConnectionHandle::channel(16);

        registry.register(dead.clone(), h_dead);
        registry.register(alive.clone(), h_alive);

        // Drop the receiver to simulate a transport that died silently
        drop(rx_dead);

        assert_eq!(registry.sweep_closed(), 1);
        assert!(!registry.is_connected(&dead));
        assert!(registry.is_connected(&alive));
        assert_eq!(registry.sweep_closed(), 0);
    }

    #[test]
    fn test_guarded_remove_spares_newer_registration() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);
        let (old, old_rx) = ConnectionHandle::channel(16);
        registry.register(id.clone(), old.clone());
        drop(old_rx);

        // Snapshot taken before the client reconnects
        let stale = registry.snapshot();

        let (new, _new_rx) = ConnectionHandle::channel(16);
        registry.register(id.clone(), new.clone());

        for (sid, handle) in stale {
            if !handle.is_open() {
                registry.remove(&sid, &handle);
            }
        }

        assert!(registry.lookup(&id).unwrap().same_connection(&new));
    }

    #[test]
    fn test_sweep_closed_spares_newer_registration() {
        let registry = ConnectionRegistry::new();
        let id = test_id(1);
        let other = test_id(2);
        let (old, old_rx) = ConnectionHandle::channel(16);
        let (dead, dead_rx) = ConnectionHandle::channel(16);
        registry.register(id.clone(), old);
        registry.register(other.clone(), dead);
        drop(old_rx);
        drop(dead_rx);

        // The client reconnects before the sweep runs
        let (new, _new_rx) = ConnectionHandle::channel(16);
        registry.register(id.clone(), new.clone());

        assert_eq!(registry.sweep_closed(), 1);
        assert!(registry.lookup(&id).unwrap().same_connection(&new));
        assert!(!registry.is_connected(&other));
    }

    #[test]
    fn test_concurrent_register_leaves_one_entry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let id = test_id(7);
        let mut receivers = Vec::new();
        let mut threads = Vec::new();

        for _ in 0..8 {
            let (handle, rx) = ConnectionHandle::channel(4);
            receivers.push(rx);
            let registry = Arc::clone(&registry);
            let id = id.clone();
            threads.push(std::thread::spawn(move || {
                registry.register(id, handle);
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.size(), 1);
        assert!(registry.lookup(&id).is_some());
    }

    #[test]
    fn test_debug_shows_count_only() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);
        registry.register(test_id(1), handle);
        assert_eq!(
            format!("{registry:?}"),
            "ConnectionRegistry { connection_count: 1 }"
        );
    }
}
