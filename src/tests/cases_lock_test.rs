use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::new_test_config;
use crate::http::RequestHeaders;
use crate::metrics::names as stat;
use crate::support::fetchers::{DeferredFetcher, MockResponse};
use crate::support::{collecting_fetch, is_done, take_done, FetchHarness, Slot};
use crate::upstream::UrlAsyncFetcher;

const URL: &str = "http://www.example.com/rewritten.js";

type Finalized = Arc<Mutex<Option<(bool, bool)>>>;

fn harness() -> (FetchHarness, Arc<DeferredFetcher>) {
    let mut deferred = None;
    let h = FetchHarness::with_origin_layer(new_test_config(), |origin| {
        let d = DeferredFetcher::new(origin);
        deferred = Some(d.clone());
        d as Arc<dyn UrlAsyncFetcher>
    });
    h.origin
        .set_response(URL, MockResponse::cacheable(600, "application/javascript", "var x;"));
    (h, deferred.expect("layer installed"))
}

fn locked_fetch(h: &FetchHarness, yield_to_redundant: bool) -> (Slot, Finalized) {
    let (sink, slot) = collecting_fetch(RequestHeaders::new(), false);
    let finalized: Finalized = Arc::new(Mutex::new(None));
    let out = finalized.clone();
    h.pipeline
        .fetch_with_lock(URL, sink, yield_to_redundant, move |lock_failure, success| {
            *out.lock() = Some((lock_failure, success));
        });
    (slot, finalized)
}

#[test]
fn test_second_builder_yields_to_lock_holder() {
    let (h, deferred) = harness();

    let (first, first_done) = locked_fetch(&h, true);
    assert_eq!(deferred.pending(), 1);
    assert_eq!(h.pipeline.locks().active_locks(), 1);

    let (second, second_done) = locked_fetch(&h, true);
    // Denied synchronously, without reaching the origin.
    assert_eq!(*second_done.lock(), Some((true, false)));
    assert!(!take_done(&second).success);
    assert_eq!(h.stat(stat::NAMED_LOCK_DENIALS), 1);
    assert_eq!(deferred.pending(), 1);

    assert!(!is_done(&first));
    deferred.release_all();
    assert_eq!(take_done(&first).body_str(), "var x;");
    assert_eq!(*first_done.lock(), Some((false, true)));
    assert_eq!(h.origin.request_count(), 1);
    assert_eq!(h.pipeline.locks().active_locks(), 0);
}

#[test]
fn test_non_yielding_builder_fetches_anyway() {
    let (h, deferred) = harness();
    let (first, _) = locked_fetch(&h, true);
    let (second, second_done) = locked_fetch(&h, false);

    assert_eq!(deferred.pending(), 2);
    deferred.release_all();
    assert!(take_done(&first).success);
    assert!(take_done(&second).success);
    assert_eq!(*second_done.lock(), Some((false, true)));
}

#[test]
fn test_lock_released_for_next_builder() {
    let (h, deferred) = harness();
    let (first, _) = locked_fetch(&h, true);
    deferred.release_all();
    assert!(take_done(&first).success);

    // Lock is free and the response cached: no origin fetch this time.
    let (again, again_done) = locked_fetch(&h, true);
    assert_eq!(*again_done.lock(), Some((false, true)));
    assert_eq!(take_done(&again).body_str(), "var x;");
    assert_eq!(deferred.pending(), 0);
    assert_eq!(h.origin.request_count(), 1);
}
