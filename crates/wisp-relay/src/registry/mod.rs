//! Connection Registry for wallet-addressed message routing.
//!
//! This module provides a thread-safe registry that maps each canonical
//! wallet identity to the one connection currently reachable under it.
//!
//! ## Architecture
//!
//! Each session registers a clone of its connection handle once the client
//! claims a wallet address. Routed envelopes are delivered by looking the
//! destination up here.
//!
//! ```text
//! Session (0xaaa…) <-> ConnectionRegistry <-> Session (0xbbb…)
//!        |                     |                     |
//!        v                     v                     v
//! ConnectionHandle    DashMap<WalletId,       ConnectionHandle
//!                     ConnectionHandle>
//! ```
//!
//! Removal is always guarded: an entry is only removed by the handle that
//! installed it, so a stale session or a late sweep can never evict a newer
//! registration for the same identity.

mod connection_registry;

pub use connection_registry::{ConnectionRegistry, Registration};
