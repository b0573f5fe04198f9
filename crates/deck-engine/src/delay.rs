//! Delay cache and per-row subscription registry.
//!
//! The [`DelayCache`] is the single source of truth for "what is the
//! last known latency of proxy P under test context C". UI rows
//! subscribe per key and get pushed the new value synchronously when a
//! probe settles, independent of any full-list rebuild.
//!
//! The cache performs no I/O and cannot fail. Writes are
//! last-write-wins; entries are never deleted, only overwritten by the
//! next probe for the same key.

use std::sync::Arc;

use dashmap::DashMap;

use deck_core::{Delay, DelayKey, DelayRecord};

/// Callback invoked with the new delay whenever a probe settles for the
/// subscribed key.
pub type DelayListener = Arc<dyn Fn(Delay) + Send + Sync>;

/// In-memory latency store with per-key push notification.
///
/// Session-scoped: created once at application start and never torn
/// down. Shared across the scheduler and any number of UI rows via
/// `Arc`.
#[derive(Default)]
pub struct DelayCache {
    records: DashMap<DelayKey, DelayRecord>,
    listeners: DashMap<DelayKey, DelayListener>,
}

impl DelayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known delay for `(proxy, context)`, or [`Delay::UNTESTED`]
    /// if no probe has ever settled for the key. Never blocks on I/O.
    pub fn get(&self, proxy: &str, context: &str) -> Delay {
        let key = DelayKey::new(proxy, context);
        self.records
            .get(&key)
            .map(|r| r.delay)
            .unwrap_or(Delay::UNTESTED)
    }

    /// The full timestamped record, if the key was ever probed.
    pub fn entry(&self, proxy: &str, context: &str) -> Option<DelayRecord> {
        self.records.get(&DelayKey::new(proxy, context)).map(|r| *r)
    }

    /// Write a settled probe result and notify the key's listener, if
    /// one is registered. The write is retained either way, so a row
    /// that mounts later still sees the warmed value via [`get`].
    ///
    /// The listener runs synchronously, after the write is visible and
    /// with no map guard held: a callback may call [`get`],
    /// [`set_listener`], or [`remove_listener`] without deadlocking.
    ///
    /// [`get`]: DelayCache::get
    /// [`set_listener`]: DelayCache::set_listener
    /// [`remove_listener`]: DelayCache::remove_listener
    pub fn record(&self, proxy: &str, context: &str, delay: Delay) {
        let key = DelayKey::new(proxy, context);
        self.records.insert(key.clone(), DelayRecord::now(delay));

        // Clone the Arc out of the shard guard before invoking.
        let listener = self.listeners.get(&key).map(|l| Arc::clone(&l));
        if let Some(listener) = listener {
            listener(delay);
        }
    }

    /// Register the listener for `(proxy, context)`.
    ///
    /// Registration is idempotent-by-key, not additive: a second
    /// registration for the same key replaces the previous listener.
    pub fn set_listener(
        &self,
        proxy: &str,
        context: &str,
        listener: impl Fn(Delay) + Send + Sync + 'static,
    ) {
        self.listeners
            .insert(DelayKey::new(proxy, context), Arc::new(listener));
    }

    /// Deregister the listener for `(proxy, context)`. A no-op if none
    /// is registered. Does not abort any in-flight probe; the probe
    /// still completes and warms the cache.
    pub fn remove_listener(&self, proxy: &str, context: &str) {
        self.listeners.remove(&DelayKey::new(proxy, context));
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
