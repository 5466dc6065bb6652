use crate::cache::{CacheEntry, CacheStore, FailureKind, FindResult, HttpCache, LruStore, RememberTtls};
use crate::http::{names, ResponseHeaders};
use crate::metrics::{names as stat, Statistics};
use crate::scheduler::{MockTimer, Timer};
use bytes::Bytes;
use std::sync::Arc;

const KEY: &str = "http://www.example.com/cacheable.css";

struct Fixture {
    timer: Arc<MockTimer>,
    store: Arc<LruStore>,
    stats: Arc<Statistics>,
    cache: HttpCache,
}

fn fixture() -> Fixture {
    let timer = Arc::new(MockTimer::new(MockTimer::APR_5_2010_MS));
    let store = Arc::new(LruStore::new(1 << 20));
    let stats = Statistics::new();
    let cache = HttpCache::new(
        store.clone(),
        timer.clone(),
        RememberTtls::default(),
        &stats,
    );
    Fixture {
        timer,
        store,
        stats,
        cache,
    }
}

fn headers(now_ms: i64, max_age_s: i64) -> ResponseHeaders {
    let mut h = ResponseHeaders::with_status(200);
    h.set_date_ms(now_ms);
    h.add(names::CACHE_CONTROL, format!("max-age={max_age_s}"));
    h.add(names::CONTENT_TYPE, "text/css");
    h
}

fn accept_all(_: &ResponseHeaders) -> bool {
    true
}

#[test]
fn test_put_then_find_until_expiry() {
    let f = fixture();
    let now = f.timer.now_ms();
    assert!(f.cache.put_response(KEY, &headers(now, 300), Bytes::from_static(b"good")));

    match f.cache.find(KEY, &accept_all) {
        FindResult::Found(entry) => assert_eq!(&entry.body[..], b"good"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(f.stats.get(stat::CACHE_HITS), 1);
    assert_eq!(f.stats.get(stat::CACHE_INSERTS), 1);

    f.timer.advance_ms(300 * 1000);
    match f.cache.find(KEY, &accept_all) {
        FindResult::NotFound { fallback: Some(entry) } => assert_eq!(&entry.body[..], b"good"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(f.stats.get(stat::CACHE_EXPIRATIONS), 1);
    assert_eq!(f.stats.get(stat::CACHE_FALLBACKS), 1);
    assert_eq!(f.stats.get(stat::CACHE_MISSES), 1);
}

#[test]
fn test_miss_counts_backend_miss() {
    let f = fixture();
    assert_eq!(
        f.cache.find(KEY, &accept_all),
        FindResult::NotFound { fallback: None }
    );
    assert_eq!(f.stats.get(stat::CACHE_BACKEND_MISSES), 1);
    assert_eq!(f.stats.get(stat::CACHE_MISSES), 1);
}

#[test]
fn test_caller_can_reject_entry() {
    let f = fixture();
    let now = f.timer.now_ms();
    f.cache
        .put_response(KEY, &headers(now, 300), Bytes::from_static(b"good"));
    let reject = |_: &ResponseHeaders| false;
    assert_eq!(
        f.cache.find(KEY, &reject),
        FindResult::NotFound { fallback: None }
    );
}

#[test]
fn test_older_put_is_dropped() {
    let f = fixture();
    let now = f.timer.now_ms();
    let newer = CacheEntry::new(headers(now, 300), Bytes::from_static(b"new"), now);
    let older = CacheEntry::new(headers(now - 10, 300), Bytes::from_static(b"old"), now - 10);
    assert!(f.cache.put(KEY, &newer));
    assert!(!f.cache.put(KEY, &older));
    match f.cache.find(KEY, &accept_all) {
        FindResult::Found(entry) => assert_eq!(&entry.body[..], b"new"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(f.stats.get(stat::CACHE_INSERTS), 1);
}

#[test]
fn test_remembered_failure_expires() {
    let f = fixture();
    f.cache.remember_failure(KEY, FailureKind::FetchFailed);
    assert_eq!(
        f.cache.find(KEY, &accept_all),
        FindResult::RecentFailure(FailureKind::FetchFailed)
    );
    f.timer.advance_ms(RememberTtls::default().fetch_failed_ms);
    assert_eq!(
        f.cache.find(KEY, &accept_all),
        FindResult::NotFound { fallback: None }
    );
}

#[test]
fn test_dropped_uses_its_own_ttl() {
    let f = fixture();
    f.cache.remember_failure(KEY, FailureKind::Dropped);
    f.timer.advance_ms(RememberTtls::default().dropped_ms - 1);
    assert_eq!(
        f.cache.find(KEY, &accept_all),
        FindResult::RecentFailure(FailureKind::Dropped)
    );
    f.timer.advance_ms(1);
    assert!(!f.cache.find(KEY, &accept_all).is_found());
}

#[test]
fn test_corrupt_entry_is_dropped() {
    let f = fixture();
    f.store.put(KEY, Bytes::from_static(b"definitely not an entry"));
    assert_eq!(
        f.cache.find(KEY, &accept_all),
        FindResult::NotFound { fallback: None }
    );
    assert_eq!(f.stats.get(stat::CACHE_CORRUPTIONS), 1);
    assert!(f.store.get(KEY).is_none());
}

#[test]
fn test_delete() {
    let f = fixture();
    let now = f.timer.now_ms();
    f.cache
        .put_response(KEY, &headers(now, 300), Bytes::from_static(b"good"));
    f.cache.delete(KEY);
    assert!(!f.cache.find(KEY, &accept_all).is_found());
    assert_eq!(f.stats.get(stat::CACHE_DELETES), 1);
}

#[test]
fn test_concurrent_puts_keep_newest() {
    let f = fixture();
    let now = f.timer.now_ms();
    let cache = &f.cache;
    std::thread::scope(|scope| {
        for writer in 0..8i64 {
            scope.spawn(move || {
                for round in 0..200i64 {
                    // Writers interleave timestamps, so newer and older puts race.
                    let at = now - 1_000 + round * 8 + (7 - writer);
                    let body = Bytes::from(format!("{at}"));
                    cache.put(KEY, &CacheEntry::new(headers(at, 3600), body, at));
                }
            });
        }
    });

    let newest = now - 1_000 + 199 * 8 + 7;
    let stored = f.store.get(KEY).expect("stored");
    let entry = CacheEntry::decode(&stored).expect("decodes");
    assert_eq!(entry.insert_ms, newest);
    assert_eq!(&entry.body[..], newest.to_string().as_bytes());
}
