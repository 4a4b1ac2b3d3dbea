//! Background sync.
//!
//! Failures are logged and counted, never retried here; rescheduling is up to
//! the runtime's own sync backoff.

use datacrypt_net::Request;
use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheKey, SharedCacheStorage};
use crate::strategy::StrategyExecutor;

/// Tag that revalidates the dynamic cache.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Outcome of a sync event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// Refetch every entry of `cache_name` and store fresh copies.
pub async fn revalidate_cache(
    executor: &StrategyExecutor,
    caches: &SharedCacheStorage,
    cache_name: &str,
) -> SyncReport {
    let keys: Vec<CacheKey> = {
        let caches = caches.read().await;
        match caches.get(cache_name) {
            Some(cache) => cache.keys().into_iter().cloned().collect(),
            None => Vec::new(),
        }
    };

    if keys.is_empty() {
        debug!(cache = cache_name, "Nothing to revalidate");
        return SyncReport::default();
    }

    let refreshes = keys.into_iter().map(|key| async move {
        let url = match Url::parse(key.url()) {
            Ok(url) => url,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unparsable cache key");
                return false;
            }
        };
        match executor.revalidate(&Request::get(url), key.clone()).await {
            Ok(response) if response.ok() => true,
            Ok(response) => {
                warn!(key = %key, status = %response.status, "Revalidation got error status");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Revalidation failed");
                false
            }
        }
    });

    let mut report = SyncReport::default();
    for refreshed in join_all(refreshes).await {
        if refreshed {
            report.refreshed += 1;
        } else {
            report.failed += 1;
        }
    }

    info!(
        cache = cache_name,
        refreshed = report.refreshed,
        failed = report.failed,
        "Background sync finished"
    );
    report
}
