//! Fetch strategy executors.

use std::sync::Arc;

use datacrypt_net::{Fetcher, Request, Response};
use tracing::{debug, trace, warn};

use crate::cache::{CacheEntry, CacheKey, SharedCacheStorage};
use crate::classify::Strategy;
use crate::error::{CacheControllerError, Result};
use crate::keepalive::WaitUntil;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached shell document served to an offline navigation.
    OfflineShell,
    /// Built by the worker itself.
    Synthesized,
}

/// A response produced by a strategy.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchOutcome {
    fn network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cached(entry: &CacheEntry, source: ResponseSource) -> Result<Self> {
        trace!(url = %entry.url, age = ?entry.age(), "Serving cached response");
        Ok(Self {
            response: entry.to_response()?,
            source,
        })
    }
}

/// Runs the three caching strategies against shared storage.
#[derive(Clone)]
pub struct StrategyExecutor {
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,
    static_cache: String,
    dynamic_cache: String,
    offline_shell: CacheKey,
}

impl StrategyExecutor {
    pub fn new(
        caches: SharedCacheStorage,
        fetcher: Arc<dyn Fetcher>,
        static_cache: String,
        dynamic_cache: String,
        offline_shell: CacheKey,
    ) -> Self {
        Self {
            caches,
            fetcher,
            static_cache,
            dynamic_cache,
            offline_shell,
        }
    }

    /// Run `strategy` for `request`.
    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &Request,
        wait_until: &WaitUntil,
    ) -> Result<FetchOutcome> {
        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, wait_until).await,
        }
    }

    /// Network, falling back to the dynamic cache and then the offline shell.
    pub async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
        let key = CacheKey::for_request(request)?;

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store(&self.dynamic_cache, key, &response).await;
                }
                Ok(FetchOutcome::network(response))
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");
                let cached = {
                    let caches = self.caches.read().await;
                    caches.match_in(&self.dynamic_cache, &key).cloned()
                };
                match cached {
                    Some(entry) => FetchOutcome::cached(&entry, ResponseSource::Cache),
                    None => self.offline_fallback(request, e.into()).await,
                }
            }
        }
    }

    /// Static cache, falling back to the network on a miss.
    pub async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
        let key = CacheKey::for_request(request)?;

        let cached = {
            let caches = self.caches.read().await;
            caches.match_in(&self.static_cache, &key).cloned()
        };
        if let Some(entry) = cached {
            return FetchOutcome::cached(&entry, ResponseSource::Cache);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            self.store(&self.static_cache, key, &response).await;
        }
        Ok(FetchOutcome::network(response))
    }

    /// Dynamic cache immediately, refreshed from the network in the background.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        wait_until: &WaitUntil,
    ) -> Result<FetchOutcome> {
        let key = CacheKey::for_request(request)?;

        let cached = {
            let caches = self.caches.read().await;
            caches.match_in(&self.dynamic_cache, &key).cloned()
        };

        match cached {
            Some(entry) => {
                let refresher = self.clone();
                let request = request.clone();
                wait_until.extend(async move {
                    if let Err(e) = refresher.revalidate(&request, key).await {
                        debug!(url = %request.url, error = %e, "Background refresh failed");
                    }
                });
                FetchOutcome::cached(&entry, ResponseSource::Cache)
            }
            None => match self.revalidate(request, key).await {
                Ok(response) => Ok(FetchOutcome::network(response)),
                Err(e) => self.offline_fallback(request, e).await,
            },
        }
    }

    /// Fetch `request` and store a successful response in the dynamic cache.
    pub async fn revalidate(&self, request: &Request, key: CacheKey) -> Result<Response> {
        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            self.store(&self.dynamic_cache, key, &response).await;
        }
        Ok(response)
    }

    /// Serve the cached shell to navigations; surface `error` otherwise.
    async fn offline_fallback(
        &self,
        request: &Request,
        error: CacheControllerError,
    ) -> Result<FetchOutcome> {
        if !request.is_navigation() {
            return Err(error);
        }

        let shell = {
            let caches = self.caches.read().await;
            caches.match_any(&self.offline_shell).cloned()
        };
        match shell {
            Some(entry) => {
                debug!(url = %request.url, "Serving offline shell");
                FetchOutcome::cached(&entry, ResponseSource::OfflineShell)
            }
            None => {
                warn!(url = %request.url, shell = %self.offline_shell, "Offline shell not cached");
                Err(error)
            }
        }
    }

    async fn store(&self, cache_name: &str, key: CacheKey, response: &Response) {
        let entry = CacheEntry::from_response(response);
        let mut caches = self.caches.write().await;
        caches.open(cache_name).put(key, entry);
    }
}
