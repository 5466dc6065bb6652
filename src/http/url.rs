//! Validated fetch URLs.

use std::fmt;

/// Why a URL was rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("malformed url {url:?}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("unsupported scheme {scheme:?} in {url:?}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("url {0:?} has no host")]
    MissingHost(String),
}

/// An absolute http(s) URL with its origin pieces extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUrl {
    inner: ::url::Url,
}

impl FetchUrl {
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let inner = ::url::Url::parse(raw).map_err(|e| UrlError::Malformed {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match inner.scheme() {
            "http" | "https" => {}
            other => {
                return Err(UrlError::UnsupportedScheme {
                    url: raw.to_string(),
                    scheme: other.to_string(),
                })
            }
        }
        match inner.host_str() {
            Some(h) if !h.is_empty() => {}
            _ => return Err(UrlError::MissingHost(raw.to_string())),
        }
        Ok(Self { inner })
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    pub fn is_https(&self) -> bool {
        self.inner.scheme() == "https"
    }

    /// Host without port.
    pub fn host(&self) -> &str {
        self.inner.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    /// `host[:port]` as it belongs in a Host header; default ports are omitted.
    pub fn host_and_port(&self) -> String {
        match self.inner.port() {
            Some(p) => format!("{}:{}", self.host(), p),
            None => self.host().to_string(),
        }
    }

    /// `scheme://host[:port]`.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme(), self.host_and_port())
    }

    /// Path plus query, as sent on the request line.
    pub fn path_and_query(&self) -> String {
        match self.inner.query() {
            Some(q) => format!("{}?{}", self.inner.path(), q),
            None => self.inner.path().to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }
}

impl fmt::Display for FetchUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
