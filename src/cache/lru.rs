//! Recency List Module
//!
//! Doubly linked list of entries ordered from most to least recently touched.
//!
//! Nodes live in a `Vec` arena and link to each other by index. Slots 0 and 1
//! are the head and tail sentinels and never hold an entry. Every linked entry
//! remembers its own slot, which turns refresh and unlink into O(1) operations.
//!
//! The list is not synchronized. It is owned by the maintenance task, which is
//! its only writer.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::entry::{Entry, DETACHED};

const HEAD: usize = 0;
const TAIL: usize = 1;

struct Node<K, V> {
    entry: Option<Arc<Entry<K, V>>>,
    /// `None` for sentinels and for entries whose deadline overflowed
    expire_at: Option<Instant>,
    prev: usize,
    next: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel(prev: usize, next: usize) -> Self {
        Self {
            entry: None,
            expire_at: None,
            prev,
            next,
        }
    }
}

// == Recency List ==
/// Tracks access order for sweep and eviction.
///
/// - Head side = most recently touched
/// - Tail side = least recently touched, and with a uniform ttl also the
///   earliest deadline
pub(crate) struct RecencyList<K, V> {
    nodes: Vec<Node<K, V>>,
    /// Released slots available for reuse
    free: Vec<usize>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel(DETACHED, TAIL), Node::sentinel(HEAD, DETACHED)],
            free: Vec::new(),
            len: 0,
        }
    }

    // == Length ==
    /// Number of linked entries, sentinels excluded.
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Touch ==
    /// Refreshes an entry dequeued from the update queue.
    ///
    /// The deadline is recomputed from `now` and the entry is unlinked from its
    /// current position. Unless it is pending removal it is relinked at the head.
    /// Returns whether the entry is linked afterwards.
    pub fn touch(&mut self, entry: Arc<Entry<K, V>>, now: Instant) -> bool {
        let expire_at = entry.expire_at_from(now);
        let slot = entry.slot();

        if slot != DETACHED {
            self.unlink(slot);
        }

        if entry.is_pending_removal() {
            if slot != DETACHED {
                self.release(slot);
            }
            return false;
        }

        entry.record_refresh();
        let slot = if slot == DETACHED {
            self.alloc(entry)
        } else {
            slot
        };
        self.nodes[slot].expire_at = expire_at;
        self.push_front(slot);
        true
    }

    // == Pop Expired ==
    /// Removes the least recent entry if its deadline passed before `now`.
    ///
    /// Returns `None` as soon as the tail entry is still live, which ends a sweep.
    pub fn pop_expired(&mut self, now: Instant) -> Option<Arc<Entry<K, V>>> {
        let slot = self.nodes[TAIL].prev;
        if slot == HEAD {
            return None;
        }

        match self.nodes[slot].expire_at {
            Some(expire_at) if now > expire_at => self.remove(slot),
            _ => None,
        }
    }

    // == Pop Back ==
    /// Removes the least recently touched entry regardless of its deadline.
    pub fn pop_back(&mut self) -> Option<Arc<Entry<K, V>>> {
        let slot = self.nodes[TAIL].prev;
        if slot == HEAD {
            return None;
        }
        self.remove(slot)
    }

    // == Iteration ==
    /// Iterates entries from most to least recently touched.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry<K, V>>> + '_ {
        let mut cursor = self.nodes[HEAD].next;
        std::iter::from_fn(move || {
            if cursor == TAIL {
                return None;
            }
            let node = &self.nodes[cursor];
            cursor = node.next;
            node.entry.as_ref()
        })
    }

    // == Internal Linking ==
    fn alloc(&mut self, entry: Arc<Entry<K, V>>) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot].entry = Some(Arc::clone(&entry));
                slot
            }
            None => {
                self.nodes.push(Node {
                    entry: Some(Arc::clone(&entry)),
                    expire_at: None,
                    prev: DETACHED,
                    next: DETACHED,
                });
                self.nodes.len() - 1
            }
        };
        entry.set_slot(slot);
        slot
    }

    fn release(&mut self, slot: usize) -> Option<Arc<Entry<K, V>>> {
        let node = &mut self.nodes[slot];
        node.expire_at = None;
        let entry = node.entry.take();
        if let Some(entry) = &entry {
            entry.set_slot(DETACHED);
        }
        self.free.push(slot);
        entry
    }

    fn remove(&mut self, slot: usize) -> Option<Arc<Entry<K, V>>> {
        self.unlink(slot);
        self.release(slot)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[slot].prev = DETACHED;
        self.nodes[slot].next = DETACHED;
        self.len -= 1;
    }

    fn push_front(&mut self, slot: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[slot].prev = HEAD;
        self.nodes[slot].next = first;
        self.nodes[first].prev = slot;
        self.nodes[HEAD].next = slot;
        self.len += 1;
    }

    /// Walks the list both ways and panics on any broken link.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut forward = Vec::new();
        let mut cursor = self.nodes[HEAD].next;
        while cursor != TAIL {
            assert!(forward.len() <= self.len, "cycle in forward links");
            let node = &self.nodes[cursor];
            let entry = node.entry.as_ref().expect("linked node without entry");
            assert_eq!(entry.slot(), cursor, "entry slot out of sync");
            assert!(!entry.is_pending_removal(), "removed entry still linked");
            assert_eq!(self.nodes[node.next].prev, cursor, "broken back link");
            forward.push(cursor);
            cursor = node.next;
        }

        let mut backward = Vec::new();
        let mut cursor = self.nodes[TAIL].prev;
        while cursor != HEAD {
            assert!(backward.len() <= self.len, "cycle in backward links");
            backward.push(cursor);
            cursor = self.nodes[cursor].prev;
        }
        backward.reverse();

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), self.len);

        // Deadlines never increase toward the tail.
        let deadlines: Vec<_> = forward.iter().map(|&s| self.nodes[s].expire_at).collect();
        for pair in deadlines.windows(2) {
            if let (Some(newer), Some(older)) = (pair[0], pair[1]) {
                assert!(newer >= older, "deadline order broken");
            }
        }
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
