//! Cache Entry Module
//!
//! The unit of storage shared by the index and the recency list.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Slot value of an entry that is not linked into the recency list.
pub(crate) const DETACHED: usize = usize::MAX;

// == Entry ==
/// A cached value plus the bookkeeping the maintenance task needs.
///
/// The index and the recency list point at the same `Arc<Entry>`. The value is
/// replaced in place on overwrite so both sides keep seeing one object.
pub(crate) struct Entry<K, V> {
    key: K,
    value: RwLock<Arc<V>>,
    ttl: Duration,
    /// Set once the key left the index; the entry must never be relinked
    pending_removal: AtomicBool,
    /// Bumped by set and get under the index lock
    touches: AtomicU64,
    /// Value of `touches` when the maintenance task last linked the entry
    refreshed: AtomicU64,
    /// Arena slot in the recency list, only touched by the maintenance task
    slot: AtomicUsize,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    pub fn new(key: K, value: Arc<V>, ttl: Duration) -> Self {
        Self {
            key,
            value: RwLock::new(value),
            ttl,
            pending_removal: AtomicBool::new(false),
            touches: AtomicU64::new(0),
            refreshed: AtomicU64::new(0),
            slot: AtomicUsize::new(DETACHED),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns a shared handle to the current value.
    pub fn value(&self) -> Arc<V> {
        Arc::clone(&self.value.read())
    }

    /// Swaps in a new value, keeping the entry's identity and list position.
    pub fn replace_value(&self, value: Arc<V>) {
        *self.value.write() = value;
    }

    // == Expiration ==
    /// Deadline for an entry touched at `now`.
    ///
    /// `None` means the ttl is too large to represent and the entry never expires.
    pub fn expire_at_from(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.ttl)
    }

    // == Removal Flag ==
    pub fn mark_removed(&self) {
        self.pending_removal.store(true, Ordering::Release);
    }

    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal.load(Ordering::Acquire)
    }

    // == Touch Tracking ==
    /// Records a set or get. Callers hold the index lock and queue a refresh afterwards.
    pub fn record_touch(&self) {
        self.touches.fetch_add(1, Ordering::AcqRel);
    }

    /// Called by the recency list when it links the entry.
    pub(crate) fn record_refresh(&self) {
        let touches = self.touches.load(Ordering::Acquire);
        self.refreshed.store(touches, Ordering::Relaxed);
    }

    /// True while a touch is still waiting in the update queue.
    pub fn touched_since_refresh(&self) -> bool {
        self.touches.load(Ordering::Acquire) != self.refreshed.load(Ordering::Relaxed)
    }

    // == List Slot ==
    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn is_linked(&self) -> bool {
        self.slot() != DETACHED
    }
}
