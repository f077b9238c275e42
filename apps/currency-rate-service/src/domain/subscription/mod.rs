//! Subscription Registry
//!
//! Tracks which currency pairs each connected client has asked to watch.
//!
//! # Design
//!
//! The registry maps a client id to the ordered history of pairs that client
//! subscribed to. It is shared by every stream's reader and sender, so the
//! whole map sits behind a single lock:
//! - readers append to their own client's entry
//! - senders take a snapshot of their client's entry and release the lock
//!   before doing any I/O
//! - an entry exists only while its `SubscriptionGuard` is alive
//!
//! Duplicate subscriptions are kept in the history; `active_pairs`
//! collapses them so a client never receives the same pair twice per push.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::currency::CurrencyPair;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscription stream (one per gRPC call).
pub type ClientId = u64;

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe registry of per-client subscriptions.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use currency_rate_service::domain::currency::{CurrencyCode, CurrencyPair};
/// use currency_rate_service::domain::subscription::SubscriptionRegistry;
///
/// let registry = Arc::new(SubscriptionRegistry::new());
/// let pair = CurrencyPair::new(CurrencyCode::Usd, CurrencyCode::Eur).unwrap();
///
/// {
///     let _guard = registry.register(7);
///     assert_eq!(registry.subscribe(7, pair), Some(1));
///     assert_eq!(registry.subscriptions(7), vec![pair]);
/// }
///
/// // Guard dropped - entry removed
/// assert!(!registry.is_registered(7));
/// assert_eq!(registry.subscribe(7, pair), None);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    clients: RwLock<HashMap<ClientId, Vec<CurrencyPair>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return the guard that owns its entry.
    ///
    /// Each id must be registered at most once at a time: a second guard for
    /// the same id would remove the entry when either guard drops.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `client` is already registered.
    #[must_use]
    pub fn register(self: &Arc<Self>, client: ClientId) -> SubscriptionGuard {
        let previous = self.clients.write().insert(client, Vec::new());
        debug_assert!(previous.is_none(), "client {client} is already registered");

        SubscriptionGuard {
            registry: Arc::clone(self),
            client,
        }
    }

    /// Append a pair to a registered client's history.
    ///
    /// Returns the new history length, or `None` if the client is not
    /// registered (its stream already ended).
    pub fn subscribe(&self, client: ClientId, pair: CurrencyPair) -> Option<usize> {
        let mut clients = self.clients.write();
        let history = clients.get_mut(&client)?;
        history.push(pair);
        Some(history.len())
    }

    /// Remove a client's entry, returning its history.
    pub fn unregister(&self, client: ClientId) -> Option<Vec<CurrencyPair>> {
        self.clients.write().remove(&client)
    }

    /// Full subscription history for a client, in submission order.
    #[must_use]
    pub fn subscriptions(&self, client: ClientId) -> Vec<CurrencyPair> {
        self.clients.read().get(&client).cloned().unwrap_or_default()
    }

    /// Distinct pairs for a client, in first-subscribed order.
    #[must_use]
    pub fn active_pairs(&self, client: ClientId) -> Vec<CurrencyPair> {
        let history = self.subscriptions(client);
        let mut seen = HashSet::with_capacity(history.len());
        history.into_iter().filter(|pair| seen.insert(*pair)).collect()
    }

    /// Check whether a client currently has an entry.
    #[must_use]
    pub fn is_registered(&self, client: ClientId) -> bool {
        self.clients.read().contains_key(&client)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let clients = self.clients.read();
        let distinct: HashSet<&CurrencyPair> = clients.values().flatten().collect();

        RegistryStats {
            client_count: clients.len(),
            subscription_count: clients.values().map(Vec::len).sum(),
            distinct_pairs: distinct.len(),
        }
    }
}

// =============================================================================
// Subscription Guard
// =============================================================================

/// Owns a client's registry entry; removes it when dropped.
///
/// Held by the task that owns the stream's lifetime so the entry is freed on
/// every exit path.
#[derive(Debug)]
pub struct SubscriptionGuard {
    registry: Arc<SubscriptionRegistry>,
    client: ClientId,
}

impl SubscriptionGuard {
    /// The client this guard owns.
    #[must_use]
    pub const fn client(&self) -> ClientId {
        self.client
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.client);
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered clients.
    pub client_count: usize,
    /// Total subscription requests across clients, duplicates included.
    pub subscription_count: usize,
    /// Distinct pairs across all clients.
    pub distinct_pairs: usize,
}

// =============================================================================
// Tests
// =============================================================================
