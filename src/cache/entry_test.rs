use crate::cache::entry::{CacheEntry, EntryError, MAGIC};
use crate::http::{names, ResponseHeaders};
use bytes::Bytes;

fn sample() -> CacheEntry {
    let mut h = ResponseHeaders::with_status(200);
    h.set_caching_policy(60_000, true);
    h.set_date_ms(1_270_493_486_000);
    h.add(names::CACHE_CONTROL, "max-age=3600");
    h.add(names::ETAG, "\"v1\"");
    h.add("X-Multi", "a");
    h.add("X-Multi", "b");
    CacheEntry::new(h, Bytes::from_static(b"good"), 1_270_493_486_123)
}

#[test]
fn test_encode_decode_keeps_everything() {
    let entry = sample();
    let encoded = entry.encode();
    assert_eq!(encoded.len(), entry.encoded_len());

    let decoded = CacheEntry::decode(&encoded).expect("decodes");
    assert_eq!(decoded, entry);
    assert_eq!(decoded.insert_ms, 1_270_493_486_123);
    assert_eq!(decoded.headers.implicit_cache_ttl_ms(), 60_000);
    assert!(decoded.headers.cache_html_by_default());
    assert_eq!(decoded.headers.lookup("X-Multi"), vec!["a", "b"]);
    assert_eq!(decoded.headers.ttl_ms(), 3_600_000);
}

#[test]
fn test_truncated_input() {
    assert_eq!(CacheEntry::decode(&[1, 2, 3]), Err(EntryError::Truncated(3)));
    let encoded = sample().encode();
    let cut = &encoded[..encoded.len() - 9];
    assert!(CacheEntry::decode(cut).is_err());
}

#[test]
fn test_bad_magic() {
    let mut raw = sample().encode().to_vec();
    raw[0] ^= 0xff;
    match CacheEntry::decode(&raw) {
        Err(EntryError::BadMagic(m)) => assert_ne!(m, MAGIC),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_flipped_body_byte_fails_checksum() {
    let mut raw = sample().encode().to_vec();
    let body_byte = raw.len() - 6;
    raw[body_byte] ^= 0x01;
    assert_eq!(CacheEntry::decode(&raw), Err(EntryError::Checksum));
}

#[test]
fn test_unsupported_version() {
    let mut raw = sample().encode().to_vec();
    raw[4] = 0x7f;
    assert_eq!(
        CacheEntry::decode(&raw),
        Err(EntryError::UnsupportedVersion(0x7f))
    );
}
