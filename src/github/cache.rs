//! Bounded response cache for conditional GETs.
//!
//! GitHub does not charge rate-limit quota for `304 Not Modified` answers, so
//! every cacheable GET is replayed with the validators of the last response
//! for the same URL. One cache is shared by all requests in the process.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::header::{ETAG, HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use lru::LruCache;
use serde_json::Value;

/// Default number of URLs remembered.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => unreachable!(),
};

/// A previously fetched body and the validators GitHub sent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Value,
}

impl CachedResponse {
    /// Builds an entry from response headers.
    ///
    /// Returns `None` when the response carries neither `ETag` nor
    /// `Last-Modified`, since such a response can never be revalidated.
    pub fn from_headers(headers: &HeaderMap, body: Value) -> Option<Self> {
        let header = |name| {
            headers
                .get(name)
                .and_then(|v: &HeaderValue| v.to_str().ok())
                .map(str::to_string)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);

        if etag.is_none() && last_modified.is_none() {
            return None;
        }

        Some(Self {
            etag,
            last_modified,
            body,
        })
    }

    /// Request headers that ask GitHub to answer 304 if nothing changed.
    pub fn conditional_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.etag.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = self
            .last_modified
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(IF_MODIFIED_SINCE, value);
        }
        headers
    }
}

/// Least-recently-used map from URL to [`CachedResponse`].
///
/// Cloning is cheap and every clone sees the same entries. The lock is only
/// held for a single map operation and never across an await.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Mutex<LruCache<String, CachedResponse>>>,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedResponse>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `url`, marking it most recently used.
    pub fn get(&self, url: &str) -> Option<CachedResponse> {
        self.lock().get(url).cloned()
    }

    /// Stores `entry`, evicting the least recently used URL when full.
    pub fn put(&self, url: impl Into<String>, entry: CachedResponse) {
        self.lock().put(url.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.lock().cap()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.lock();
        f.debug_struct("ResponseCache")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}
