//! Ordered header multimap with case-insensitive lookup.
//!
//! Both request and response headers keep the order and original case of
//! names as received; lookups never care about case.

/// Header names used across the fetch pipeline.
pub mod names {
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const AGE: &str = "Age";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const COOKIE: &str = "Cookie";
    pub const DATE: &str = "Date";
    pub const ETAG: &str = "ETag";
    pub const EXPIRES: &str = "Expires";
    pub const HOST: &str = "Host";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const KEEP_ALIVE: &str = "Keep-Alive";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const PRAGMA: &str = "Pragma";
    pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";
    pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";
    pub const PROXY_CONNECTION: &str = "Proxy-Connection";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const SET_COOKIE2: &str = "Set-Cookie2";
    pub const TE: &str = "TE";
    pub const TRAILER: &str = "Trailer";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const UPGRADE: &str = "Upgrade";
    pub const USER_AGENT: &str = "User-Agent";
    pub const VARY: &str = "Vary";
    pub const WARNING: &str = "Warning";

    pub const X_ORIGINAL_CONTENT_LENGTH: &str = "X-Original-Content-Length";
    pub const X_PSA_LOAD_SHED: &str = "X-PSA-Load-Shed";
    pub const X_PSA_PURGE_REQUEST: &str = "X-PSA-Purge-Request";
    pub const X_PAGE_SPEED: &str = "X-Page-Speed";
}

/// Ordered (name, value) pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping any existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every value of `name`. Returns true if anything was removed.
    pub fn remove_all(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// Removes every header whose name is in `names`.
    pub fn remove_all_from_set(&mut self, names: &[&str]) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(k, _)| !names.iter().any(|n| k.eq_ignore_ascii_case(n)));
        before != self.entries.len()
    }

    /// Removes one comma-separated token from the values of `name`, dropping
    /// the header entirely when nothing is left.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let mut removed = false;
        let mut kept = Vec::with_capacity(self.entries.len());
        for (k, v) in self.entries.drain(..) {
            if !k.eq_ignore_ascii_case(name) {
                kept.push((k, v));
                continue;
            }
            let tokens: Vec<&str> = split_list(&v)
                .filter(|t| {
                    let keep = !t.eq_ignore_ascii_case(value);
                    removed |= !keep;
                    keep
                })
                .collect();
            if !tokens.is_empty() {
                kept.push((k, tokens.join(", ")));
            }
        }
        self.entries = kept;
        removed
    }

    /// Replaces all values of `name` with a single value.
    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(pos) = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            self.entries[pos].1 = value;
            let mut idx = 0;
            self.entries.retain(|(k, _)| {
                let keep = idx <= pos || !k.eq_ignore_ascii_case(name);
                idx += 1;
                keep
            });
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    /// All raw values of `name`, in order.
    pub fn lookup(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The value of `name` when it occurs exactly once.
    pub fn lookup1(&self, name: &str) -> Option<&str> {
        let mut found = None;
        for (k, v) in &self.entries {
            if k.eq_ignore_ascii_case(name) {
                if found.is_some() {
                    return None;
                }
                found = Some(v.as_str());
            }
        }
        found
    }

    /// All comma-separated tokens across every value of `name`.
    pub fn lookup_tokens(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| split_list(v))
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// True when any comma-separated token of `name` equals `value`.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.lookup_tokens(name)
            .iter()
            .any(|t| t.eq_ignore_ascii_case(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copies every header from `other`, appending.
    pub fn extend_from(&mut self, other: &Headers) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Approximate serialized size, used for header byte statistics.
    pub fn size_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len() + 4).sum()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Splits a comma-separated header value into trimmed, non-empty tokens.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|t| !t.is_empty())
}
