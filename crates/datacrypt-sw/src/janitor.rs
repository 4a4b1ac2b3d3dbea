//! Periodic trimming of the dynamic cache.
//!
//! A plain size bound: the oldest-inserted entries go first. Reads never
//! refresh an entry, so this is not an LRU.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{CacheKey, SharedCacheStorage};

/// Delete the oldest entries of `cache_name` until at most `max_entries`
/// remain. Returns how many were deleted.
pub async fn trim_cache(caches: &SharedCacheStorage, cache_name: &str, max_entries: usize) -> usize {
    let mut caches = caches.write().await;
    let Some(cache) = caches.get(cache_name) else {
        return 0;
    };

    let excess = cache.len().saturating_sub(max_entries);
    if excess == 0 {
        return 0;
    }

    let doomed: Vec<CacheKey> = cache.keys().into_iter().take(excess).cloned().collect();
    let cache = caches.open(cache_name);
    for key in &doomed {
        cache.delete(key);
    }

    debug!(cache = cache_name, deleted = doomed.len(), remaining = cache.len(), "Trimmed cache");
    doomed.len()
}

/// Background task keeping one cache under its entry limit.
#[derive(Clone)]
pub struct Janitor {
    caches: SharedCacheStorage,
    cache_name: String,
    max_entries: usize,
    period: Duration,
}

impl Janitor {
    pub fn new(
        caches: SharedCacheStorage,
        cache_name: impl Into<String>,
        max_entries: usize,
        period: Duration,
    ) -> Self {
        Self {
            caches,
            cache_name: cache_name.into(),
            max_entries,
            period,
        }
    }

    /// Trim once now.
    pub async fn run_once(&self) -> usize {
        trim_cache(&self.caches, &self.cache_name, self.max_entries).await
    }

    /// Trim every `period`, starting one period from now.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(cache = %self.cache_name, period = ?self.period, "Cache janitor started");
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
