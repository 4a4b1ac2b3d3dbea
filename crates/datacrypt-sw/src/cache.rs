//! Cache storage: named generations of request/response snapshots.
//!
//! ```text
//! CacheStorage
//!     ├── static-v3.0  (Cache)
//!     │       └── CacheKey → CacheEntry
//!     └── dynamic-v3.0 (Cache)
//!             └── CacheKey → CacheEntry
//! ```
//!
//! Entries keep insertion order. Reads never reorder; a put of an existing key
//! replaces the entry and moves it to the newest position.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use datacrypt_net::{Request, Response};
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::error::{CacheControllerError, Result};

/// Cache storage shared by every worker instance and event.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

/// Normalized cache key: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    method: String,
    url: String,
}

impl CacheKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET.to_string(),
            url: url.into(),
        }
    }

    /// Key for a request. Only GET requests are cacheable.
    pub fn for_request(request: &Request) -> Result<Self> {
        if request.method != Method::GET {
            return Err(CacheControllerError::cache(format!(
                "{} requests are not cacheable: {}",
                request.method, request.url
            )));
        }
        Ok(Self::get(&request.url))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A cached response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Final response URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in received order. Values are raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored at (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response.
    pub fn from_response(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Time since the snapshot was stored.
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.cached_at))
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url)?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| CacheControllerError::cache(format!("bad status {}: {}", self.status, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(n, v);
            }
        }

        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone().into(),
        })
    }
}

/// One cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: IndexMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: IndexMap::new(),
        }
    }

    /// Match a key.
    pub fn match_key(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry as the newest.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.shift_remove(&key);
        self.entries.insert(key, entry);
    }

    /// Store several entries at once, in order.
    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (CacheKey, CacheEntry)>) {
        for (key, entry) in entries {
            self.put(key, entry);
        }
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// Keys, oldest first.
    pub fn keys(&self) -> Vec<&CacheKey> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache generations, addressed by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create shared storage.
    pub fn shared() -> SharedCacheStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Match in one named cache.
    pub fn match_in(&self, name: &str, key: &CacheKey) -> Option<&CacheEntry> {
        self.caches.get(name).and_then(|c| c.match_key(key))
    }

    /// Match across all caches, in name order.
    pub fn match_any(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.keys()
            .into_iter()
            .find_map(|name| self.match_in(&name, key))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn key(path: &str) -> CacheKey {
        CacheKey::get(&Url::parse(&format!("https://example.com{}", path)).unwrap())
    }

    fn entry(path: &str) -> CacheEntry {
        let url = Url::parse(&format!("https://example.com{}", path)).unwrap();
        CacheEntry::from_response(&Response::new(url, StatusCode::OK, "body"))
    }

    #[test]
    fn test_key_strips_fragment() {
        let a = CacheKey::get(&Url::parse("https://example.com/about#team").unwrap());
        let b = CacheKey::get(&Url::parse("https://example.com/about").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "GET https://example.com/about");
    }

    #[test]
    fn test_key_rejects_post() {
        let url = Url::parse("https://example.com/share-target").unwrap();
        let request = Request::post(url, Bytes::from_static(b"title=x"));
        assert!(CacheKey::for_request(&request).is_err());
    }

    #[test]
    fn test_entry_round_trips_headers() {
        let url = Url::parse("https://example.com/api/data.json").unwrap();
        let response = Response::new(url, StatusCode::OK, r#"{"a":1}"#).with_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let restored = CacheEntry::from_response(&response).to_response().unwrap();
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.header("content-type"), Some("application/json"));
        assert_eq!(restored.body, Bytes::from_static(br#"{"a":1}"#));
    }

    #[test]
    fn test_entry_age() {
        let mut stored = entry("/about");
        assert!(stored.age() < Duration::from_secs(60));

        stored.cached_at -= 90_000;
        assert!(stored.age() >= Duration::from_secs(90));

        // Clock skew never yields a negative age.
        stored.cached_at = u64::MAX;
        assert_eq!(stored.age(), Duration::ZERO);
    }

    #[test]
    fn test_entry_keeps_non_utf8_header_values() {
        let url = Url::parse("https://example.com/files/resume.pdf").unwrap();
        let disposition = HeaderValue::from_bytes(b"attachment; filename=\"r\xe9sum\xe9.pdf\"").unwrap();
        let response = Response::new(url, StatusCode::OK, "%PDF").with_header(
            http::header::CONTENT_DISPOSITION,
            disposition.clone(),
        );

        let restored = CacheEntry::from_response(&response).to_response().unwrap();
        assert_eq!(restored.headers.len(), response.headers.len());
        assert_eq!(
            restored.headers.get(http::header::CONTENT_DISPOSITION),
            Some(&disposition)
        );
    }

    #[test]
    fn test_cache_put_and_delete() {
        let mut cache = Cache::new("dynamic-v3.0");
        cache.put(key("/about"), entry("/about"));

        assert!(cache.match_key(&key("/about")).is_some());
        assert!(cache.match_key(&key("/other")).is_none());
        assert!(cache.delete(&key("/about")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_keeps_insertion_order() {
        let mut cache = Cache::new("dynamic-v3.0");
        cache.put(key("/a"), entry("/a"));
        cache.put(key("/b"), entry("/b"));
        cache.put(key("/c"), entry("/c"));

        // Reads do not reorder.
        let _ = cache.match_key(&key("/a"));
        let order: Vec<_> = cache.keys().iter().map(|k| k.url().to_string()).collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c"
            ]
        );

        // Re-putting moves to newest.
        cache.put(key("/a"), entry("/a"));
        assert_eq!(cache.keys()[0].url(), "https://example.com/b");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("static-v3.0"));

        storage.open("static-v3.0").put(key("/index.html"), entry("/index.html"));
        storage.open("dynamic-v3.0");

        assert_eq!(storage.keys(), vec!["dynamic-v3.0", "static-v3.0"]);
        assert!(storage.match_any(&key("/index.html")).is_some());
        assert!(storage.match_in("dynamic-v3.0", &key("/index.html")).is_none());

        assert!(storage.delete("static-v3.0"));
        assert!(!storage.delete("static-v3.0"));
    }
}
