//! HTTP semantics over a byte store: freshness, validity, remembered
//! failures and write ordering.

use super::entry::CacheEntry;
use super::store::CacheStore;
use crate::http::{status, ResponseHeaders};
use crate::metrics::{names, Statistics, Variable};
use crate::scheduler::Timer;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Keys hash onto this many write locks; puts to one key are serialized.
const PUT_LOCK_STRIPES: usize = 64;

/// Why a negative entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    FetchFailed,
    NotCacheable200,
    NotCacheable,
    Dropped,
    Empty,
}

impl FailureKind {
    pub fn status(self) -> u16 {
        match self {
            FailureKind::FetchFailed => status::REMEMBER_FETCH_FAILED,
            FailureKind::NotCacheable200 => status::REMEMBER_NOT_CACHEABLE_200,
            FailureKind::NotCacheable => status::REMEMBER_NOT_CACHEABLE,
            FailureKind::Dropped => status::REMEMBER_FETCH_DROPPED,
            FailureKind::Empty => status::REMEMBER_EMPTY,
        }
    }

    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            status::REMEMBER_FETCH_FAILED => Some(FailureKind::FetchFailed),
            status::REMEMBER_NOT_CACHEABLE_200 => Some(FailureKind::NotCacheable200),
            status::REMEMBER_NOT_CACHEABLE => Some(FailureKind::NotCacheable),
            status::REMEMBER_FETCH_DROPPED => Some(FailureKind::Dropped),
            status::REMEMBER_EMPTY => Some(FailureKind::Empty),
            _ => None,
        }
    }

    /// Not-cacheable entries only suppress insertion; the others
    /// short-circuit the fetch.
    pub fn blocks_fetch(self) -> bool {
        !matches!(self, FailureKind::NotCacheable | FailureKind::NotCacheable200)
    }
}

/// TTLs of remembered failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RememberTtls {
    pub fetch_failed_ms: i64,
    pub not_cacheable_ms: i64,
    pub dropped_ms: i64,
}

impl Default for RememberTtls {
    fn default() -> Self {
        Self {
            fetch_failed_ms: 300_000,
            not_cacheable_ms: 300_000,
            dropped_ms: 10_000,
        }
    }
}

impl RememberTtls {
    fn ttl_ms(&self, kind: FailureKind) -> i64 {
        match kind {
            FailureKind::FetchFailed | FailureKind::Empty => self.fetch_failed_ms,
            FailureKind::NotCacheable | FailureKind::NotCacheable200 => self.not_cacheable_ms,
            FailureKind::Dropped => self.dropped_ms,
        }
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    /// Fresh and accepted by the caller.
    Found(CacheEntry),
    /// Nothing usable. `fallback` holds an expired entry that can still be
    /// revalidated or served stale.
    NotFound { fallback: Option<CacheEntry> },
    RecentFailure(FailureKind),
}

impl FindResult {
    pub fn is_found(&self) -> bool {
        matches!(self, FindResult::Found(_))
    }
}

struct CacheStats {
    hits: Arc<Variable>,
    misses: Arc<Variable>,
    expirations: Arc<Variable>,
    inserts: Arc<Variable>,
    deletes: Arc<Variable>,
    fallbacks: Arc<Variable>,
    backend_hits: Arc<Variable>,
    backend_misses: Arc<Variable>,
    time_us: Arc<Variable>,
    corruptions: Arc<Variable>,
}

pub struct HttpCache {
    store: Arc<dyn CacheStore>,
    timer: Arc<dyn Timer>,
    remember: RememberTtls,
    stats: CacheStats,
    put_locks: Box<[Mutex<()>]>,
}

impl HttpCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        timer: Arc<dyn Timer>,
        remember: RememberTtls,
        stats: &Statistics,
    ) -> Self {
        Self {
            store,
            timer,
            remember,
            stats: CacheStats {
                hits: stats.variable(names::CACHE_HITS),
                misses: stats.variable(names::CACHE_MISSES),
                expirations: stats.variable(names::CACHE_EXPIRATIONS),
                inserts: stats.variable(names::CACHE_INSERTS),
                deletes: stats.variable(names::CACHE_DELETES),
                fallbacks: stats.variable(names::CACHE_FALLBACKS),
                backend_hits: stats.variable(names::CACHE_BACKEND_HITS),
                backend_misses: stats.variable(names::CACHE_BACKEND_MISSES),
                time_us: stats.variable(names::CACHE_TIME_US),
                corruptions: stats.variable(names::CACHE_CORRUPTIONS),
            },
            put_locks: (0..PUT_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn put_lock(&self, key: &str) -> &Mutex<()> {
        &self.put_locks[(xxh3_64(key.as_bytes()) as usize) % self.put_locks.len()]
    }

    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Looks `key` up. `is_valid` lets the caller reject a stored response;
    /// a rejected entry is reported as not found without fallback.
    pub fn find(&self, key: &str, is_valid: &dyn Fn(&ResponseHeaders) -> bool) -> FindResult {
        let start_us = self.timer.now_us();
        let result = self.find_inner(key, is_valid);
        self.stats.time_us.add(self.timer.now_us() - start_us);
        match &result {
            FindResult::Found(_) => {
                self.stats.hits.increment();
            }
            FindResult::NotFound { fallback } => {
                self.stats.misses.increment();
                if fallback.is_some() {
                    self.stats.fallbacks.increment();
                }
            }
            FindResult::RecentFailure(_) => {}
        }
        result
    }

    fn find_inner(&self, key: &str, is_valid: &dyn Fn(&ResponseHeaders) -> bool) -> FindResult {
        let Some(raw) = self.store.get(key) else {
            self.stats.backend_misses.increment();
            return FindResult::NotFound { fallback: None };
        };
        self.stats.backend_hits.increment();
        let entry = match CacheEntry::decode(&raw) {
            Ok(e) => e,
            Err(e) => {
                self.stats.corruptions.increment();
                warn!(component = "http_cache", event = "corrupt_entry", key, error = %e);
                self.store.delete(key);
                return FindResult::NotFound { fallback: None };
            }
        };
        let now_ms = self.timer.now_ms();

        if let Some(kind) = FailureKind::from_status(entry.headers.status()) {
            if now_ms < entry.insert_ms + self.remember.ttl_ms(kind) {
                return FindResult::RecentFailure(kind);
            }
            self.stats.expirations.increment();
            return FindResult::NotFound { fallback: None };
        }
        if !is_valid(&entry.headers) {
            debug!(component = "http_cache", event = "rejected_by_caller", key);
            return FindResult::NotFound { fallback: None };
        }
        if entry.headers.is_expired(now_ms) {
            self.stats.expirations.increment();
            return FindResult::NotFound {
                fallback: Some(entry),
            };
        }
        FindResult::Found(entry)
    }

    /// Stores `entry` unless the store already holds one written later.
    /// Returns whether it was written.
    pub fn put(&self, key: &str, entry: &CacheEntry) -> bool {
        let _write = self.put_lock(key).lock();
        if let Some(existing) = self.store.get(key).and_then(|b| CacheEntry::decode(&b).ok()) {
            if existing.insert_ms > entry.insert_ms {
                debug!(
                    component = "http_cache",
                    event = "stale_put_dropped",
                    key,
                    existing_ms = existing.insert_ms,
                    put_ms = entry.insert_ms
                );
                return false;
            }
        }
        self.store.put(key, entry.encode());
        self.stats.inserts.increment();
        true
    }

    /// Stores a response written now.
    pub fn put_response(&self, key: &str, headers: &ResponseHeaders, body: Bytes) -> bool {
        let entry = CacheEntry::new(headers.clone(), body, self.timer.now_ms());
        self.put(key, &entry)
    }

    /// Writes a negative entry for `key`.
    pub fn remember_failure(&self, key: &str, kind: FailureKind) {
        let now_ms = self.timer.now_ms();
        let mut headers = ResponseHeaders::with_status(kind.status());
        headers.set_date_ms(now_ms);
        debug!(component = "http_cache", event = "remember_failure", key, kind = ?kind);
        self.put(key, &CacheEntry::new(headers, Bytes::new(), now_ms));
    }

    pub fn delete(&self, key: &str) {
        let _write = self.put_lock(key).lock();
        self.store.delete(key);
        self.stats.deletes.increment();
    }
}
