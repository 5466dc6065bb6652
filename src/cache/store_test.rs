use crate::cache::store::{CacheStore, LruStore};
use bytes::Bytes;

fn value(n: usize) -> Bytes {
    Bytes::from(vec![b'x'; n])
}

#[test]
fn test_put_get_delete() {
    let store = LruStore::new(1024);
    assert!(store.get("a").is_none());
    store.put("a", Bytes::from_static(b"1"));
    assert_eq!(store.get("a"), Some(Bytes::from_static(b"1")));
    assert_eq!(store.len(), 1);
    assert_eq!(store.size_bytes(), 2);

    store.put("a", Bytes::from_static(b"22"));
    assert_eq!(store.get("a"), Some(Bytes::from_static(b"22")));
    assert_eq!(store.len(), 1);
    assert_eq!(store.size_bytes(), 3);

    store.delete("a");
    assert!(store.get("a").is_none());
    assert!(store.is_empty());
    assert_eq!(store.size_bytes(), 0);
}

#[test]
fn test_evicts_least_recently_used() {
    // Each entry weighs 1 + 9 = 10 bytes.
    let store = LruStore::new(30);
    store.put("a", value(9));
    store.put("b", value(9));
    store.put("c", value(9));
    // Touch "a" so "b" becomes the eviction candidate.
    assert!(store.get("a").is_some());
    store.put("d", value(9));

    assert!(store.get("b").is_none());
    assert!(store.get("a").is_some());
    assert!(store.get("c").is_some());
    assert!(store.get("d").is_some());
    assert_eq!(store.evictions(), 1);
    assert!(store.size_bytes() <= 30);
}

#[test]
fn test_oversized_value_is_not_stored() {
    let store = LruStore::new(10);
    store.put("k", value(3));
    store.put("k", value(100));
    assert!(store.get("k").is_none());
    assert!(store.is_empty());
}

#[test]
fn test_slots_are_reused() {
    let store = LruStore::new(100);
    for round in 0..5 {
        for i in 0..5 {
            store.put(&format!("k{i}"), value(round + 1));
        }
        for i in 0..5 {
            store.delete(&format!("k{i}"));
        }
    }
    assert!(store.is_empty());
    store.put("z", value(1));
    assert_eq!(store.get("z"), Some(value(1)));
    store.clear();
    assert!(store.is_empty());
}
