//! Thread-safe, bounded, LRU-ordered cache of upstream responses.
//!
//! The cache is keyed on the request's `Host` authority (the "known
//! limitation" spec.md §6 calls out: all paths on one origin collapse into
//! a single entry). It is constructed once by the program entry and
//! shared across workers via `Clone` (cheap — the map and its lock live
//! behind an `Arc`); there is no hidden global singleton.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::http;
use crate::logger::RequestLogger;

/// Upper bound on the number of entries the cache will hold before
/// evicting the least-recently-used one.
pub const CAPACITY: usize = 10_240;

/// One cached upstream response and the freshness metadata derived from
/// its `Cache-Control` header at insertion time. Immutable after
/// insertion: updating the same URL means replacing the entry wholesale.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub url: String,
    pub response: Bytes,
    pub must_revalidate: bool,
    pub no_cache: bool,
    /// True iff the upstream response carried no `Cache-Control` header at
    /// all. Deliberately permissive per spec.md §3/§9 — not narrowed to
    /// responses that explicitly authorise caching.
    pub never_expires: bool,
    pub created_at: Instant,
    pub max_age: Duration,
}

impl CacheEntry {
    fn expire_time(&self) -> Instant {
        self.created_at + self.max_age
    }

    /// `never_expires` OR the entry's `max-age` window has not elapsed.
    pub fn is_fresh(&self) -> bool {
        self.never_expires || Instant::now() < self.expire_time()
    }

    /// Not `never_expires`, AND (must-revalidate OR no-cache OR the
    /// `max-age` window has elapsed).
    pub fn is_expired(&self) -> bool {
        !self.never_expires
            && (self.must_revalidate || self.no_cache || Instant::now() > self.expire_time())
    }
}

#[derive(Clone)]
pub struct Cache {
    entries: Arc<Mutex<LruCache<String, CacheEntry>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    /// Same as [`Cache::new`] but with an explicit capacity, letting
    /// `main` honour [`crate::config::Config::cache_capacity`] instead of
    /// always building the fixed [`CAPACITY`] default.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity must be non-zero"),
            ))),
        }
    }

    /// Parses `response`'s headers/Cache-Control, derives a `CacheEntry`,
    /// and inserts or replaces the entry for `url`, moving it to the MRU
    /// head. Logs `ETag`/`Cache-Control` notes when present, and an
    /// eviction note when inserting a new key pushes the cache over
    /// [`CAPACITY`]. Returns a snapshot of the stored entry.
    pub async fn insert(
        &self,
        id: &str,
        url: &str,
        response: Bytes,
        logger: &RequestLogger,
    ) -> CacheEntry {
        let headers = http::parse_headers(&response);
        let cache_control_str = http::header_value(&headers, "Cache-Control").unwrap_or("");
        let cache_control = http::parse_cache_control(cache_control_str);

        let must_revalidate = cache_control.contains_key("must-revalidate");
        let no_cache = cache_control.contains_key("no-cache");
        let never_expires = cache_control_str.is_empty();
        let max_age = cache_control
            .get("max-age")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        if let Some(etag) = http::header_value(&headers, "ETag") {
            logger.note_with_id(id, &format!("ETag: {etag}")).await;
        }
        if !cache_control_str.is_empty() {
            logger
                .note_with_id(id, &format!("Cache-Control: {cache_control_str}"))
                .await;
        }

        let entry = CacheEntry {
            url: url.to_string(),
            response,
            must_revalidate,
            no_cache,
            never_expires,
            created_at: Instant::now(),
            max_age: Duration::from_secs(max_age),
        };

        let mut guard = self.entries.lock().await;
        // `push` replaces-and-moves-to-front for an existing key, or
        // evicts the LRU tail and returns it when inserting a new key
        // over capacity; either way it's the single mutation point the
        // original's found/not-found branches both funnel into.
        let displaced = guard.push(url.to_string(), entry.clone());
        drop(guard);

        if let Some((displaced_url, _)) = displaced {
            if displaced_url != url {
                logger
                    .note(&format!("evicted {displaced_url} from cache"))
                    .await;
            }
        }

        entry
    }

    /// Looks up `url`, moving it to the MRU head on a hit.
    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        let mut guard = self.entries.lock().await;
        guard.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
