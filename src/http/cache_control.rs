//! Cache-Control directive parsing.

use super::headers::{names, Headers};
use std::collections::HashMap;

/// Caps delta-seconds overflow the way RFC 9111 suggests (2^31).
pub const DELTA_SECONDS_OVERFLOW_VALUE: u32 = 2_147_483_648;

/// Parsed directives of every Cache-Control line, later lines override.
#[derive(Debug, Default, Clone)]
pub struct CacheControl {
    directives: HashMap<String, Option<String>>,
}

impl CacheControl {
    /// Returns `None` when the header is absent.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let lines = headers.lookup(names::CACHE_CONTROL);
        if lines.is_empty() {
            return None;
        }
        let mut directives = HashMap::new();
        for line in lines {
            for part in line.split([',', ';']) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let (key, value) = match part.split_once('=') {
                    Some((k, v)) => (k.trim(), Some(v.trim().trim_matches('"').to_string())),
                    None => (part, None),
                };
                directives.insert(key.to_ascii_lowercase(), value);
            }
        }
        Some(Self { directives })
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.directives.contains_key(key)
    }

    pub fn public(&self) -> bool {
        self.has_key("public")
    }

    pub fn private(&self) -> bool {
        self.has_key("private")
    }

    pub fn no_cache(&self) -> bool {
        self.has_key("no-cache")
    }

    pub fn no_store(&self) -> bool {
        self.has_key("no-store")
    }

    pub fn must_revalidate(&self) -> bool {
        self.has_key("must-revalidate")
    }

    pub fn max_age(&self) -> Option<u32> {
        self.delta_seconds("max-age")
    }

    pub fn s_maxage(&self) -> Option<u32> {
        self.delta_seconds("s-maxage")
    }

    pub fn stale_while_revalidate(&self) -> Option<u32> {
        self.delta_seconds("stale-while-revalidate")
    }

    /// Parses a numeric directive. Malformed values count as absent;
    /// overflow saturates.
    fn delta_seconds(&self, key: &str) -> Option<u32> {
        let raw = self.directives.get(key)?.as_deref()?;
        match raw.parse::<u32>() {
            Ok(v) => Some(v),
            Err(e) if *e.kind() == std::num::IntErrorKind::PosOverflow => {
                Some(DELTA_SECONDS_OVERFLOW_VALUE)
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(lines: &[&str]) -> CacheControl {
        let mut h = Headers::new();
        for l in lines {
            h.add("Cache-Control", *l);
        }
        CacheControl::from_headers(&h).unwrap()
    }

    #[test]
    fn test_directives() {
        let c = cc(&["public, max-age=3600", "s-maxage=\"60\"; must-revalidate"]);
        assert!(c.public());
        assert!(!c.private());
        assert_eq!(c.max_age(), Some(3600));
        assert_eq!(c.s_maxage(), Some(60));
        assert!(c.must_revalidate());
    }

    #[test]
    fn test_bad_and_overflowing_numbers() {
        assert_eq!(cc(&["max-age=abc"]).max_age(), None);
        assert_eq!(
            cc(&["max-age=99999999999999"]).max_age(),
            Some(DELTA_SECONDS_OVERFLOW_VALUE)
        );
    }

    #[test]
    fn test_absent_header() {
        assert!(CacheControl::from_headers(&Headers::new()).is_none());
    }
}
