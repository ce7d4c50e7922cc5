//! Cache Store Module
//!
//! Public facade over the index and the maintenance task.
//!
//! `set`, `get` and `delete` change the index under its lock and take effect
//! immediately. Each touched entry is then handed to the maintenance task
//! through a bounded queue. That task is the only writer of the recency list.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cache::entry::Entry;
use crate::cache::index::Index;
use crate::cache::{CacheStats, StatsRecorder};
use crate::config::CacheOptions;
use crate::tasks::{spawn_maintenance_task, Maintainer};

// == Local Cache ==
/// In-process cache with sliding expiration and least-recently-used ordering.
///
/// Share it between tasks with an `Arc`. The maintenance task stops on
/// [`shutdown`](Self::shutdown) or when the cache is dropped.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// use std::time::Duration;
/// use localcache::{CacheOptions, LocalCache};
///
/// let cache: LocalCache<String, u32> =
///     LocalCache::new(CacheOptions::new().with_expire(Duration::from_secs(60)));
///
/// cache.set("answer".to_string(), 42u32).await;
/// assert_eq!(cache.get("answer").await.as_deref(), Some(&42));
///
/// cache.delete("answer").await;
/// assert!(cache.get("answer").await.is_none());
/// # cache.shutdown().await;
/// # });
/// ```
pub struct LocalCache<K, V> {
    index: Arc<RwLock<Index<K, V>>>,
    updates: mpsc::Sender<Arc<Entry<K, V>>>,
    stats: Arc<StatsRecorder>,
    options: CacheOptions,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> LocalCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an empty cache and spawns its maintenance task.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new(options: CacheOptions) -> Self {
        let index = Arc::new(RwLock::new(Index::new()));
        let stats = Arc::new(StatsRecorder::new());
        let shutdown = Arc::new(Notify::new());
        let (updates, receiver) = mpsc::channel(options.queue_capacity());

        let maintainer = Maintainer::new(Arc::clone(&index), Arc::clone(&stats), options.max_keys());
        let worker = spawn_maintenance_task(
            maintainer,
            receiver,
            Arc::clone(&shutdown),
            options.tick_interval(),
        );

        if let Some(max_memory) = options.max_memory() {
            debug!(
                "max_memory of {} bytes recorded; no eviction is driven by it",
                max_memory
            );
        }
        info!(
            "Cache created: expire={:?}, max_keys={:?}, queue_capacity={}",
            options.expire(),
            options.max_keys(),
            options.queue_capacity()
        );

        Self {
            index,
            updates,
            stats,
            options,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    // == Set ==
    /// Stores a value, creating the entry or replacing its value in place.
    ///
    /// The entry's ttl restarts once the maintenance task applies the update.
    /// Waits while the update queue is full.
    pub async fn set(&self, key: K, value: impl Into<Arc<V>>) {
        let (entry, _) = self
            .index
            .write()
            .await
            .upsert(key, value.into(), self.options.expire());

        self.enqueue(entry).await;
    }

    // == Get ==
    /// Returns the value for `key` and slides its expiration forward.
    pub async fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.index.read().await.get(key).map(|entry| {
            entry.record_touch();
            Arc::clone(entry)
        });

        match entry {
            Some(entry) => {
                self.stats.record_hit();
                let value = entry.value();
                self.enqueue(entry).await;
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes `key` immediately. Unlinking from the recency list happens later.
    ///
    /// Returns whether the key was present. Deleting a missing key is a no-op.
    pub async fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.index.write().await.remove(key);

        match removed {
            Some(entry) => {
                entry.mark_removed();
                self.enqueue(entry).await;
                true
            }
            None => false,
        }
    }

    // == Contains Key ==
    /// Checks for a live key without refreshing it.
    pub async fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.read().await.contains_key(key)
    }

    // == Length ==
    /// Returns the number of live keys.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let total_entries = self.len().await;
        self.stats.snapshot(total_entries)
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    // == Lifecycle ==
    /// Whether the maintenance task is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the maintenance task and waits for it to finish.
    ///
    /// Keys stay readable and writable afterwards, but nothing expires,
    /// is evicted or is compacted anymore. Calling it again does nothing.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        self.shutdown.notify_one();
        if let Err(err) = worker.await {
            warn!("Cache maintenance task ended abnormally: {}", err);
        }
    }

    async fn enqueue(&self, entry: Arc<Entry<K, V>>) {
        // The index lock is already released here, so a full queue never
        // blocks the maintenance task from taking it.
        if self.updates.send(entry).await.is_err() {
            trace!("Maintenance task not running; recency update dropped");
        }
    }
}

impl<K, V> fmt::Debug for LocalCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K, V> Drop for LocalCache<K, V> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}
