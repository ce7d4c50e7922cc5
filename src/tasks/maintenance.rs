//! Maintenance Task
//!
//! The single background worker that owns the recency list. It applies the
//! refreshes queued by set/get/delete, sweeps expired entries from the tail on
//! every tick, enforces the key limit and rebuilds the index when most of its
//! capacity belongs to deleted keys.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::entry::Entry;
use crate::cache::index::Index;
use crate::cache::lru::RecencyList;
use crate::cache::StatsRecorder;

// == Maintainer ==
/// State owned by the maintenance task.
pub(crate) struct Maintainer<K, V> {
    index: Arc<RwLock<Index<K, V>>>,
    list: RecencyList<K, V>,
    stats: Arc<StatsRecorder>,
    max_keys: Option<usize>,
}

impl<K, V> Maintainer<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(
        index: Arc<RwLock<Index<K, V>>>,
        stats: Arc<StatsRecorder>,
        max_keys: Option<usize>,
    ) -> Self {
        Self {
            index,
            list: RecencyList::new(),
            stats,
            max_keys,
        }
    }

    // == Refresh ==
    /// Applies one dequeued update: new deadline, move to head or unlink.
    pub async fn refresh(&mut self, entry: Arc<Entry<K, V>>, now: Instant) {
        let linked = self.list.touch(entry, now);

        if let Some(max_keys) = self.max_keys {
            if linked && self.list.len() > max_keys {
                self.evict_overflow(max_keys).await;
            }
        }
    }

    // == Tick ==
    /// Periodic work: sweep expired entries, then compact the index if worthwhile.
    pub async fn tick(&mut self, now: Instant) {
        let expired = self.sweep(now).await;
        if expired > 0 {
            debug!("Sweep: removed {} expired entries", expired);
        }

        if let Some((before, after)) = self.compact().await {
            debug!(
                "Compaction: rebuilt index from {} historical keys to {} live keys",
                before, after
            );
        }
    }

    // == Sweep ==
    /// Unlinks entries from the tail while their deadline has passed.
    ///
    /// The walk stops at the first live entry: with one ttl for every entry,
    /// list order is deadline order.
    pub async fn sweep(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        while let Some(entry) = self.list.pop_expired(now) {
            expired.push(entry);
        }
        if expired.is_empty() {
            return 0;
        }

        let removed = self.remove_from_index(&expired).await;
        self.stats.record_expirations(removed);
        removed
    }

    // == Capacity Eviction ==
    async fn evict_overflow(&mut self, max_keys: usize) {
        let mut evicted = Vec::new();
        while self.list.len() > max_keys {
            match self.list.pop_back() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }

        let removed = self.remove_from_index(&evicted).await;
        self.stats.record_evictions(removed);
        debug!("Eviction: removed {} entries over the {} key limit", removed, max_keys);
    }

    /// Drops popped entries from the index under one write lock.
    ///
    /// An entry touched after its last refresh stays: the set or get that
    /// touched it has a refresh queued, which relinks it at the head.
    async fn remove_from_index(&self, entries: &[Arc<Entry<K, V>>]) -> usize {
        let mut index = self.index.write().await;
        let mut removed = 0;
        for entry in entries {
            if entry.touched_since_refresh() {
                continue;
            }
            entry.mark_removed();
            if index.remove_entry(entry) {
                removed += 1;
            }
        }
        removed
    }

    // == Compaction ==
    /// Rebuilds the index into a fresh map once live keys drop below half of
    /// the keys created since the last rebuild.
    ///
    /// Copy and swap happen under one write lock so no concurrent set or
    /// delete can fall between them. Returns (historical, live) counts when a
    /// rebuild happened.
    pub async fn compact(&self) -> Option<(usize, usize)> {
        if !self.index.read().await.needs_compaction() {
            return None;
        }

        let mut index = self.index.write().await;
        if !index.needs_compaction() {
            return None;
        }
        let before = index.key_counter();
        let after = index.compact();
        drop(index);

        self.stats.record_compaction();
        Some((before, after))
    }

    #[cfg(test)]
    pub(crate) fn list(&self) -> &RecencyList<K, V> {
        &self.list
    }
}

// == Spawn ==
/// Spawns the maintenance task.
///
/// The task runs until `shutdown` is notified or every sender of `updates` is
/// dropped. The returned handle can be awaited after notifying, or aborted.
pub(crate) fn spawn_maintenance_task<K, V>(
    mut maintainer: Maintainer<K, V>,
    mut updates: mpsc::Receiver<Arc<Entry<K, V>>>,
    shutdown: Arc<Notify>,
    tick_interval: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting cache maintenance task with tick interval of {:?}",
            tick_interval
        );

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(entry) => maintainer.refresh(entry, Instant::now()).await,
                    None => {
                        debug!("Update queue closed");
                        break;
                    }
                },
                _ = ticker.tick() => maintainer.tick(Instant::now()).await,
                _ = shutdown.notified() => break,
            }
        }

        info!("Cache maintenance task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(200);

    struct Fixture {
        index: Arc<RwLock<Index<String, u32>>>,
        stats: Arc<StatsRecorder>,
        maintainer: Maintainer<String, u32>,
    }

    fn fixture(max_keys: Option<usize>) -> Fixture {
        let index = Arc::new(RwLock::new(Index::new()));
        let stats = Arc::new(StatsRecorder::new());
        let maintainer = Maintainer::new(Arc::clone(&index), Arc::clone(&stats), max_keys);
        Fixture {
            index,
            stats,
            maintainer,
        }
    }

    impl Fixture {
        async fn set(&mut self, key: &str, value: u32, now: Instant) -> Arc<Entry<String, u32>> {
            let (entry, _) = self
                .index
                .write()
                .await
                .upsert(key.to_string(), Arc::new(value), TTL);
            self.maintainer.refresh(Arc::clone(&entry), now).await;
            entry
        }

        async fn delete(&mut self, key: &str, now: Instant) {
            let removed = self.index.write().await.remove(key);
            if let Some(entry) = removed {
                entry.mark_removed();
                self.maintainer.refresh(entry, now).await;
            }
        }

        async fn live(&self, key: &str) -> bool {
            self.index.read().await.contains_key(key)
        }

        fn order(&self) -> Vec<String> {
            self.maintainer.list().iter().map(|e| e.key().clone()).collect()
        }
    }

    #[tokio::test]
    async fn test_refresh_orders_most_recent_first() {
        let mut fx = fixture(None);
        let now = Instant::now();

        fx.set("a", 1, now).await;
        fx.set("b", 2, now).await;
        fx.set("a", 3, now).await;

        assert_eq!(fx.order(), vec!["a", "b"]);
        fx.maintainer.list().assert_consistent();
    }

    #[tokio::test]
    async fn test_delete_unlinks_entry() {
        let mut fx = fixture(None);
        let now = Instant::now();

        fx.set("a", 1, now).await;
        fx.set("b", 2, now).await;
        fx.delete("a", now).await;

        assert_eq!(fx.order(), vec!["b"]);
        assert!(!fx.live("a").await);
        fx.maintainer.list().assert_consistent();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let mut fx = fixture(None);
        let start = Instant::now();

        fx.set("a", 1, start).await;
        fx.set("b", 2, start + Duration::from_millis(100)).await;

        let removed = fx.maintainer.sweep(start + Duration::from_millis(250)).await;

        assert_eq!(removed, 1);
        assert!(!fx.live("a").await);
        assert!(fx.live("b").await);
        assert_eq!(fx.stats.snapshot(0).expirations, 1);
        fx.maintainer.list().assert_consistent();
    }

    #[tokio::test]
    async fn test_sweep_respects_refresh() {
        let mut fx = fixture(None);
        let start = Instant::now();

        fx.set("a", 1, start).await;
        fx.set("b", 2, start).await;
        fx.set("c", 3, start).await;
        // Read of "c" at 150ms moves its deadline to 350ms.
        let c = fx.index.read().await.get("c").cloned().unwrap();
        fx.maintainer
            .refresh(c, start + Duration::from_millis(150))
            .await;

        fx.maintainer.sweep(start + Duration::from_millis(250)).await;

        assert!(!fx.live("a").await);
        assert!(!fx.live("b").await);
        assert!(fx.live("c").await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_key_that_was_set_again() {
        let mut fx = fixture(None);
        let start = Instant::now();

        let old = fx.set("a", 1, start).await;
        // Delete and re-set before the maintainer sees the delete.
        fx.index.write().await.remove("a");
        old.mark_removed();
        let new = fx
            .index
            .write()
            .await
            .upsert("a".to_string(), Arc::new(2), TTL)
            .0;

        let removed = fx.maintainer.sweep(start + Duration::from_secs(1)).await;

        assert_eq!(removed, 0);
        assert!(fx.live("a").await);
        assert_eq!(*new.value(), 2);
    }

    #[tokio::test]
    async fn test_sweep_keeps_entry_overwritten_before_refresh() {
        let mut fx = fixture(None);
        let start = Instant::now();

        let a = fx.set("a", 1, start).await;
        // Set returned but its refresh is still queued when the tick fires.
        fx.index
            .write()
            .await
            .upsert("a".to_string(), Arc::new(2), TTL);

        let removed = fx.maintainer.sweep(start + Duration::from_millis(300)).await;

        assert_eq!(removed, 0);
        assert!(fx.live("a").await);
        assert!(!a.is_pending_removal());
        assert_eq!(fx.stats.snapshot(0).expirations, 0);

        let later = start + Duration::from_millis(300);
        fx.maintainer.refresh(Arc::clone(&a), later).await;
        assert_eq!(fx.order(), vec!["a"]);
        fx.maintainer.sweep(later + Duration::from_millis(100)).await;
        assert_eq!(fx.index.read().await.get("a").map(|e| *e.value()), Some(2));
        fx.maintainer.list().assert_consistent();
    }

    #[tokio::test]
    async fn test_sweep_keeps_entry_read_before_refresh() {
        let mut fx = fixture(None);
        let start = Instant::now();

        let a = fx.set("a", 1, start).await;
        if let Some(entry) = fx.index.read().await.get("a") {
            entry.record_touch();
        }

        assert_eq!(fx.maintainer.sweep(start + Duration::from_millis(300)).await, 0);
        assert!(fx.live("a").await);

        fx.maintainer.refresh(a, start + Duration::from_millis(300)).await;
        assert_eq!(fx.order(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_eviction_skips_entry_touched_before_refresh() {
        let mut fx = fixture(Some(2));
        let now = Instant::now();

        let a = fx.set("a", 1, now).await;
        fx.set("b", 2, now).await;
        // "a" is read, then "c" arrives before the read's refresh is applied.
        a.record_touch();
        fx.set("c", 3, now).await;

        assert!(fx.live("a").await);
        assert_eq!(fx.order(), vec!["c", "b"]);

        // The read's refresh relinks "a" and pushes "b" out instead.
        fx.maintainer.refresh(a, now).await;
        assert!(!fx.live("b").await);
        assert_eq!(fx.order(), vec!["a", "c"]);
        assert_eq!(fx.stats.snapshot(0).evictions, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_relinked_by_late_refresh() {
        let mut fx = fixture(None);
        let start = Instant::now();

        let a = fx.set("a", 1, start).await;
        fx.maintainer.sweep(start + Duration::from_secs(1)).await;
        fx.maintainer.refresh(Arc::clone(&a), start + Duration::from_secs(1)).await;

        assert!(a.is_pending_removal());
        assert!(fx.maintainer.list().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_eviction_removes_least_recent() {
        let mut fx = fixture(Some(2));
        let now = Instant::now();

        fx.set("a", 1, now).await;
        fx.set("b", 2, now).await;
        fx.set("a", 1, now).await;
        fx.set("c", 3, now).await;

        assert!(fx.live("a").await);
        assert!(!fx.live("b").await);
        assert!(fx.live("c").await);
        assert_eq!(fx.order(), vec!["c", "a"]);
        assert_eq!(fx.stats.snapshot(0).evictions, 1);
    }

    #[tokio::test]
    async fn test_compaction_triggers_below_half() {
        let mut fx = fixture(None);
        let now = Instant::now();

        for i in 0..10 {
            fx.set(&format!("k{}", i), i, now).await;
        }
        for i in 0..5 {
            fx.delete(&format!("k{}", i), now).await;
        }
        assert_eq!(fx.maintainer.compact().await, None);

        fx.delete("k5", now).await;
        assert_eq!(fx.maintainer.compact().await, Some((10, 4)));
        assert_eq!(fx.index.read().await.key_counter(), 4);
        assert_eq!(fx.stats.snapshot(0).compactions, 1);

        for i in 6..10 {
            assert!(fx.live(&format!("k{}", i)).await);
        }
    }

    #[tokio::test]
    async fn test_spawned_task_stops_on_shutdown() {
        let fx = fixture(None);
        let (_tx, rx) = mpsc::channel(4);
        let shutdown = Arc::new(Notify::new());

        let handle = spawn_maintenance_task(
            fx.maintainer,
            rx,
            Arc::clone(&shutdown),
            Duration::from_millis(10),
        );
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_spawned_task_stops_when_senders_drop() {
        let fx = fixture(None);
        let (tx, rx) = mpsc::channel(4);

        let handle = spawn_maintenance_task(
            fx.maintainer,
            rx,
            Arc::new(Notify::new()),
            Duration::from_millis(10),
        );
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop")
            .unwrap();
    }
}
