use crate::http::headers::{names, Headers};

#[test]
fn test_lookup_is_case_insensitive_and_ordered() {
    let mut h = Headers::new();
    h.add("Set-Cookie", "a=1");
    h.add("content-type", "text/html");
    h.add("SET-COOKIE", "b=2");

    assert_eq!(h.lookup(names::SET_COOKIE), vec!["a=1", "b=2"]);
    assert_eq!(h.lookup1(names::CONTENT_TYPE), Some("text/html"));
    assert_eq!(h.lookup1(names::SET_COOKIE), None, "multi-valued header has no single value");
    assert!(h.has("Content-Type"));
}

#[test]
fn test_replace_keeps_position_and_drops_duplicates() {
    let mut h = Headers::new();
    h.add("A", "1");
    h.add("Cache-Control", "max-age=10");
    h.add("B", "2");
    h.add("cache-control", "public");

    h.replace(names::CACHE_CONTROL, "max-age=60");

    let all: Vec<_> = h.iter().collect();
    assert_eq!(all, vec![("A", "1"), ("Cache-Control", "max-age=60"), ("B", "2")]);
}

#[test]
fn test_remove_value_drops_single_token() {
    let mut h = Headers::new();
    h.add("Vary", "Accept-Encoding, Cookie");
    assert!(h.remove_value(names::VARY, "cookie"));
    assert_eq!(h.lookup1(names::VARY), Some("Accept-Encoding"));

    assert!(h.remove_value(names::VARY, "Accept-Encoding"));
    assert!(!h.has(names::VARY));
}

#[test]
fn test_tokens_span_multiple_values() {
    let mut h = Headers::new();
    h.add("Cache-Control", "public, max-age=100");
    h.add("Cache-Control", "no-transform");
    assert!(h.has_value(names::CACHE_CONTROL, "NO-TRANSFORM"));
    assert_eq!(h.lookup_tokens(names::CACHE_CONTROL).len(), 3);
}

#[test]
fn test_remove_all_from_set() {
    let mut h = Headers::new();
    h.add("Connection", "close");
    h.add("Keep-Alive", "5");
    h.add("Accept", "*/*");
    assert!(h.remove_all_from_set(&[names::CONNECTION, names::KEEP_ALIVE]));
    assert_eq!(h.len(), 1);
}
