//! Which responses the cache fetcher may store and when it refreshes them.

use crate::http::{names, status, RequestHeaders, ResponseHeaders};

/// Value of the `Warning` header on responses served from an expired entry.
pub const STALE_WARNING: &str = "110 Response is stale";

/// Hits closer than this to expiry are refreshed in the background.
pub const MIN_FRESHEN_WINDOW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub respect_vary: bool,
    pub default_cache_html: bool,
    /// None means no limit.
    pub max_cacheable_content_length: Option<u64>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            respect_vary: false,
            default_cache_html: false,
            max_cacheable_content_length: None,
        }
    }
}

impl CachePolicy {
    pub fn exceeds_max_length(&self, len: u64) -> bool {
        self.max_cacheable_content_length
            .map(|max| len > max)
            .unwrap_or(false)
    }

    /// Storability of `response` fetched for `request`, ignoring its size.
    ///
    /// Stale fallbacks and 304s are never stored; Set-Cookie and Vary rules
    /// are applied by [`ResponseHeaders::is_proxy_cacheable_for`].
    pub fn is_cacheable(&self, request: &RequestHeaders, response: &ResponseHeaders) -> bool {
        if response.status() == status::NOT_MODIFIED || is_stale_fallback(response) {
            return false;
        }
        response.is_proxy_cacheable_for(request, self.respect_vary)
    }
}

pub fn is_stale_fallback(response: &ResponseHeaders) -> bool {
    response
        .lookup(names::WARNING)
        .iter()
        .any(|w| w.trim_start().starts_with("110"))
}

/// Remaining lifetime under which a hit triggers a background refresh.
pub fn freshen_window_ms(ttl_ms: i64) -> i64 {
    (ttl_ms / 5).max(MIN_FRESHEN_WINDOW_MS)
}

/// Whether the caller's conditional headers match `cached`, so a bare 304 is
/// the whole answer. If-None-Match takes precedence over If-Modified-Since.
pub fn matches_conditional(request: &RequestHeaders, cached: &ResponseHeaders) -> bool {
    match request.if_none_match() {
        Some(inm) => cached.etag().map(|etag| etag == inm.trim()).unwrap_or(false),
        None => match request.if_modified_since() {
            Some(ims) => cached
                .last_modified()
                .map(|lm| lm == ims.trim())
                .unwrap_or(false),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn cacheable_response() -> ResponseHeaders {
        let mut h = ResponseHeaders::with_status(200);
        h.set_date_ms(1_000_000);
        h.add(names::CACHE_CONTROL, "max-age=3600");
        h.add(names::CONTENT_TYPE, "text/css");
        h
    }

    #[test]
    fn test_stale_fallback_is_not_stored() {
        let policy = CachePolicy::default();
        let req = RequestHeaders::with_method(Method::Get);
        let mut resp = cacheable_response();
        assert!(policy.is_cacheable(&req, &resp));
        resp.add(names::WARNING, STALE_WARNING);
        assert!(!policy.is_cacheable(&req, &resp));
    }

    #[test]
    fn test_set_cookie_is_never_stored() {
        let policy = CachePolicy::default();
        let req = RequestHeaders::with_method(Method::Get);
        let mut resp = cacheable_response();
        resp.add(names::SET_COOKIE, "a=b");
        assert!(!policy.is_cacheable(&req, &resp));
    }

    #[test]
    fn test_max_length() {
        let policy = CachePolicy {
            max_cacheable_content_length: Some(10),
            ..CachePolicy::default()
        };
        assert!(!policy.exceeds_max_length(10));
        assert!(policy.exceeds_max_length(11));
        assert!(!CachePolicy::default().exceeds_max_length(u64::MAX));
    }

    #[test]
    fn test_freshen_window() {
        assert_eq!(freshen_window_ms(60_000), MIN_FRESHEN_WINDOW_MS);
        assert_eq!(freshen_window_ms(10 * 3_600_000), 2 * 3_600_000);
    }

    #[test]
    fn test_if_none_match_takes_precedence() {
        let mut cached = cacheable_response();
        cached.add(names::ETAG, "\"v1\"");
        cached.add(names::LAST_MODIFIED, "Mon, 05 Apr 2010 18:51:26 GMT");

        let mut req = RequestHeaders::new();
        req.add(names::IF_NONE_MATCH, "\"v1\"");
        assert!(matches_conditional(&req, &cached));

        let mut req = RequestHeaders::new();
        req.add(names::IF_NONE_MATCH, "\"v2\"");
        req.add(names::IF_MODIFIED_SINCE, "Mon, 05 Apr 2010 18:51:26 GMT");
        assert!(!matches_conditional(&req, &cached));

        let mut req = RequestHeaders::new();
        req.add(names::IF_MODIFIED_SINCE, "Mon, 05 Apr 2010 18:51:26 GMT");
        assert!(matches_conditional(&req, &cached));

        assert!(!matches_conditional(&RequestHeaders::new(), &cached));
    }
}
