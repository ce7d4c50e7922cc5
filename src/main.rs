//! Local Cache demo
//!
//! Runs a short concurrent workload against one cache and prints its statistics.
//! Options come from the `LOCALCACHE_*` environment variables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use localcache::{CacheOptions, LocalCache};

const WRITERS: usize = 4;
const KEYS_PER_WRITER: usize = 2_500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = CacheOptions::from_env().context("failed to load cache options")?;
    let settle = options.tick_interval() * 4;
    let cache: Arc<LocalCache<String, usize>> = Arc::new(LocalCache::new(options));

    // Writers fill disjoint key ranges, read them back, then delete most of them.
    let mut workers = Vec::with_capacity(WRITERS);
    for writer in 0..WRITERS {
        let cache = Arc::clone(&cache);
        workers.push(tokio::spawn(async move {
            let keys: Vec<String> = (0..KEYS_PER_WRITER)
                .map(|i| format!("w{}-k{}", writer, i))
                .collect();
            for (i, key) in keys.iter().enumerate() {
                cache.set(key.clone(), i).await;
            }
            for key in &keys {
                cache.get(key.as_str()).await;
            }
            for key in keys.iter().skip(KEYS_PER_WRITER / 5) {
                cache.delete(key.as_str()).await;
            }
        }));
    }
    for worker in workers {
        worker.await.context("workload task failed")?;
    }

    info!("Workload finished, letting maintenance settle for {:?}", settle);
    tokio::time::sleep(settle.max(Duration::from_millis(100))).await;

    let stats = cache.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!("Hit rate: {:.2}", stats.hit_rate());

    cache.shutdown().await;
    Ok(())
}
