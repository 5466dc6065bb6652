//! Response headers value object with a lazily computed caching summary.

use super::cache_control::CacheControl;
use super::date;
use super::headers::{names, Headers};
use super::method::Method;
use super::request::RequestHeaders;
use super::status;
use once_cell::sync::OnceCell;

/// Used when a response carries no explicit freshness information.
pub const DEFAULT_IMPLICIT_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

/// Status codes a shared cache may store without explicit permission.
const CACHEABLE_STATUSES: &[u16] = &[200, 203, 300, 301, 410];

/// Everything the cache layers need to know about a response, derived once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachingSummary {
    pub cacheable: bool,
    pub proxy_cacheable: bool,
    /// Freshness came from Cache-Control or Expires rather than the implicit TTL.
    pub explicit: bool,
    pub date_ms: Option<i64>,
    pub ttl_ms: i64,
    pub expiration_ms: i64,
    pub vary: Vec<String>,
    pub content_length: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub server_error: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    major: u8,
    minor: u8,
    status: u16,
    reason: String,
    headers: Headers,
    implicit_cache_ttl_ms: i64,
    cache_html_by_default: bool,
    summary: OnceCell<CachingSummary>,
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 1,
            status: 0,
            reason: String::new(),
            headers: Headers::new(),
            implicit_cache_ttl_ms: DEFAULT_IMPLICIT_CACHE_TTL_MS,
            cache_html_by_default: false,
            summary: OnceCell::new(),
        }
    }
}

impl PartialEq for ResponseHeaders {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.status == other.status
            && self.reason == other.reason
            && self.headers == other.headers
    }
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(code: u16) -> Self {
        let mut h = Self::default();
        h.set_status(code);
        h
    }

    fn invalidate(&mut self) {
        self.summary = OnceCell::new();
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Zero until a status line has been seen or synthesized.
    pub fn has_status(&self) -> bool {
        self.status != 0
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.major = major;
        self.minor = minor;
    }

    /// Sets the code and its canonical reason phrase.
    pub fn set_status(&mut self, code: u16) {
        self.set_status_and_reason(code, status::reason_phrase(code));
    }

    pub fn set_status_and_reason(&mut self, code: u16, reason: &str) {
        self.status = code;
        self.reason = reason.to_string();
        self.invalidate();
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.add(name, value);
        self.invalidate();
    }

    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        self.headers.replace(name, value);
        self.invalidate();
    }

    pub fn remove_all(&mut self, name: &str) -> bool {
        let removed = self.headers.remove_all(name);
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn remove_all_from_set(&mut self, names: &[&str]) -> bool {
        let removed = self.headers.remove_all_from_set(names);
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let removed = self.headers.remove_value(name, value);
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn lookup1(&self, name: &str) -> Option<&str> {
        self.headers.lookup1(name)
    }

    pub fn lookup(&self, name: &str) -> Vec<&str> {
        self.headers.lookup(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.headers.has_value(name, value)
    }

    /// Copies status line and headers, keeping this object's caching policy.
    pub fn copy_from(&mut self, other: &ResponseHeaders) {
        self.major = other.major;
        self.minor = other.minor;
        self.status = other.status;
        self.reason = other.reason.clone();
        self.headers = other.headers.clone();
        self.invalidate();
    }

    pub fn clear(&mut self) {
        self.status = 0;
        self.reason.clear();
        self.headers.clear();
        self.invalidate();
    }

    /// Parameters of the freshness heuristic for responses without
    /// explicit caching headers.
    pub fn set_caching_policy(&mut self, implicit_cache_ttl_ms: i64, cache_html_by_default: bool) {
        self.implicit_cache_ttl_ms = implicit_cache_ttl_ms;
        self.cache_html_by_default = cache_html_by_default;
        self.invalidate();
    }

    pub fn set_implicit_cache_ttl_ms(&mut self, ttl_ms: i64) {
        self.implicit_cache_ttl_ms = ttl_ms;
        self.invalidate();
    }

    pub fn set_cache_html_by_default(&mut self, on: bool) {
        self.cache_html_by_default = on;
        self.invalidate();
    }

    pub fn implicit_cache_ttl_ms(&self) -> i64 {
        self.implicit_cache_ttl_ms
    }

    pub fn cache_html_by_default(&self) -> bool {
        self.cache_html_by_default
    }

    pub fn set_date_ms(&mut self, ms: i64) {
        self.replace(names::DATE, date::format_ms(ms));
    }

    /// Adds a Date header when the origin omitted one.
    pub fn fix_date_header(&mut self, now_ms: i64) {
        if self.date_ms().is_none() {
            self.set_date_ms(now_ms);
        }
    }

    pub fn set_last_modified_ms(&mut self, ms: i64) {
        self.replace(names::LAST_MODIFIED, date::format_ms(ms));
    }

    pub fn set_content_length(&mut self, len: u64) {
        self.replace(names::CONTENT_LENGTH, len.to_string());
    }

    /// The caching summary, computed on first use after any mutation.
    pub fn summary(&self) -> &CachingSummary {
        self.summary.get_or_init(|| self.compute_caching())
    }

    fn compute_caching(&self) -> CachingSummary {
        let cc = CacheControl::from_headers(&self.headers);
        let date_ms = self.headers.lookup1(names::DATE).and_then(date::parse_ms);
        let vary: Vec<String> = self
            .headers
            .lookup_tokens(names::VARY)
            .into_iter()
            .map(str::to_string)
            .collect();
        let content_length = self
            .headers
            .lookup1(names::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let last_modified = self.headers.lookup1(names::LAST_MODIFIED).map(str::to_string);
        let etag = self.headers.lookup1(names::ETAG).map(str::to_string);
        let server_error = (500..600).contains(&self.status);

        let mut summary = CachingSummary {
            date_ms,
            vary,
            content_length,
            last_modified,
            etag,
            server_error,
            ..CachingSummary::default()
        };

        let Some(date_ms) = date_ms else {
            return summary;
        };
        if !CACHEABLE_STATUSES.contains(&self.status) {
            return summary;
        }
        let pragma_no_cache = self.headers.has_value(names::PRAGMA, "no-cache");
        if pragma_no_cache {
            return summary;
        }

        let mut explicit_ttl_ms = None;
        if let Some(cc) = &cc {
            if cc.no_store() || cc.no_cache() {
                return summary;
            }
            if let Some(s) = cc.s_maxage().or(cc.max_age()) {
                explicit_ttl_ms = Some(i64::from(s) * 1000);
            }
        }
        if explicit_ttl_ms.is_none() {
            if let Some(expires) = self.headers.lookup1(names::EXPIRES) {
                // Unparseable Expires means already expired.
                let exp_ms = date::parse_ms(expires).unwrap_or(date_ms);
                explicit_ttl_ms = Some(exp_ms - date_ms);
            }
        }

        let ttl_ms = match explicit_ttl_ms {
            Some(ttl) => {
                summary.explicit = true;
                ttl
            }
            None if self.is_html() && !self.cache_html_by_default => return summary,
            None => self.implicit_cache_ttl_ms,
        };
        if ttl_ms <= 0 {
            return summary;
        }

        let private = cc.as_ref().map(|c| c.private()).unwrap_or(false);
        let sets_cookie =
            self.headers.has(names::SET_COOKIE) || self.headers.has(names::SET_COOKIE2);

        summary.cacheable = true;
        summary.proxy_cacheable = !private && !sets_cookie;
        summary.ttl_ms = ttl_ms;
        summary.expiration_ms = date_ms.saturating_add(ttl_ms);
        summary
    }

    pub fn is_cacheable(&self) -> bool {
        self.summary().cacheable
    }

    /// Shared-cache storability of the response itself, ignoring the request.
    pub fn is_proxy_cacheable(&self) -> bool {
        self.summary().proxy_cacheable
    }

    /// Shared-cache storability for this request and Vary policy.
    ///
    /// `Vary: *` is never cacheable. HTML varying on Cookie is never cached
    /// when the request carried cookies. With `respect_vary`, HTML with any
    /// Vary and other resources varying on anything but Accept-Encoding are
    /// not cached.
    pub fn is_proxy_cacheable_for(&self, request: &RequestHeaders, respect_vary: bool) -> bool {
        if request.method != Method::Get || !self.is_proxy_cacheable() {
            return false;
        }
        let html = self.is_html();
        for v in &self.summary().vary {
            if v == "*" {
                return false;
            }
            if html && v.eq_ignore_ascii_case(names::COOKIE) && request.has_cookies() {
                return false;
            }
            if respect_vary && (html || !v.eq_ignore_ascii_case(names::ACCEPT_ENCODING)) {
                return false;
            }
        }
        true
    }

    pub fn is_server_error(&self) -> bool {
        self.summary().server_error
    }

    pub fn ttl_ms(&self) -> i64 {
        self.summary().ttl_ms
    }

    pub fn expiration_ms(&self) -> i64 {
        self.summary().expiration_ms
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.summary().expiration_ms
    }

    pub fn date_ms(&self) -> Option<i64> {
        self.summary().date_ms
    }

    pub fn vary(&self) -> &[String] {
        &self.summary().vary
    }

    pub fn content_length(&self) -> Option<u64> {
        self.summary().content_length
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.summary().last_modified.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.summary().etag.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.lookup1(names::CONTENT_TYPE)
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| {
                let mime = ct.split(';').next().unwrap_or_default().trim();
                mime.eq_ignore_ascii_case("text/html")
                    || mime.eq_ignore_ascii_case("application/xhtml+xml")
            })
            .unwrap_or(false)
    }

    pub fn is_gzipped(&self) -> bool {
        self.headers.has_value(names::CONTENT_ENCODING, "gzip")
    }

    /// Approximate header size for statistics.
    pub fn size_bytes(&self) -> usize {
        self.reason.len() + 16 + self.headers.size_bytes()
    }
}
