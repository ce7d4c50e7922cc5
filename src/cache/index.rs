//! Index Module
//!
//! Hash mapping from key to entry, plus the counter that decides when the
//! backing map is rebuilt to hand memory back.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::entry::Entry;

// == Index ==
/// O(1) key lookup over shared entries.
///
/// A `HashMap` keeps its capacity after removals. `key_counter` counts keys
/// created since the last rebuild so the maintenance task can tell when most
/// of that capacity is dead weight.
pub(crate) struct Index<K, V> {
    map: HashMap<K, Arc<Entry<K, V>>>,
    key_counter: usize,
}

impl<K, V> Index<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            key_counter: 0,
        }
    }

    // == Lookup ==
    pub fn get<Q>(&self, key: &Q) -> Option<&Arc<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    // == Upsert ==
    /// Replaces the value of an existing entry or creates a new one.
    ///
    /// Returns the entry and whether it was newly created. Only creation
    /// advances the key counter. Overwriting records a touch so a sweep that
    /// already popped the entry leaves it in place.
    pub fn upsert(&mut self, key: K, value: Arc<V>, ttl: Duration) -> (Arc<Entry<K, V>>, bool) {
        if let Some(existing) = self.map.get(&key) {
            existing.replace_value(value);
            existing.record_touch();
            return (Arc::clone(existing), false);
        }

        let entry = Arc::new(Entry::new(key.clone(), value, ttl));
        self.map.insert(key, Arc::clone(&entry));
        self.key_counter += 1;
        (entry, true)
    }

    // == Remove ==
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Arc<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key)
    }

    /// Removes the entry's key only while the key still maps to this entry.
    ///
    /// A key deleted and set again holds a new entry that must survive the
    /// removal of the old one.
    pub fn remove_entry(&mut self, entry: &Arc<Entry<K, V>>) -> bool {
        let same = self
            .map
            .get(entry.key())
            .is_some_and(|current| Arc::ptr_eq(current, entry));
        if same {
            self.map.remove(entry.key());
        }
        same
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn key_counter(&self) -> usize {
        self.key_counter
    }

    // == Compaction ==
    /// True once fewer than half of the keys created since the last rebuild are live.
    pub fn needs_compaction(&self) -> bool {
        self.map.len() < self.key_counter / 2
    }

    /// Moves every live entry into a freshly sized map and drops the old one.
    ///
    /// Returns the live count, which also becomes the new key counter.
    pub fn compact(&mut self) -> usize {
        let live = std::mem::take(&mut self.map);
        let mut fresh = HashMap::with_capacity(live.len());
        fresh.extend(live);
        self.map = fresh;
        self.key_counter = self.map.len();
        self.key_counter
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.map.capacity()
    }
}

impl<K, V> Default for Index<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
