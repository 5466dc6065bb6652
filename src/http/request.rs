use super::headers::{names, Headers};
use super::method::Method;
use bytes::Bytes;

/// Outgoing request description: method, header multimap and optional body.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.add(name, value);
    }

    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        self.headers.replace(name, value);
    }

    pub fn remove_all(&mut self, name: &str) -> bool {
        self.headers.remove_all(name)
    }

    pub fn lookup1(&self, name: &str) -> Option<&str> {
        self.headers.lookup1(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    /// All `Cookie` values joined the way a server would see them.
    pub fn cookies(&self) -> Option<String> {
        let all = self.headers.lookup(names::COOKIE);
        if all.is_empty() {
            None
        } else {
            Some(all.join("; "))
        }
    }

    /// True when a non-empty Cookie header is present.
    pub fn has_cookies(&self) -> bool {
        self.headers
            .lookup(names::COOKIE)
            .iter()
            .any(|c| !c.trim().is_empty())
    }

    pub fn if_modified_since(&self) -> Option<&str> {
        self.headers.lookup1(names::IF_MODIFIED_SINCE)
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.headers.lookup1(names::IF_NONE_MATCH)
    }

    pub fn accepts_gzip(&self) -> bool {
        self.headers.lookup_tokens(names::ACCEPT_ENCODING).iter().any(|t| {
            let coding = t.split(';').next().unwrap_or_default().trim();
            coding.eq_ignore_ascii_case("gzip")
        })
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.lookup1(names::USER_AGENT)
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.lookup1(names::HOST)
    }
}
