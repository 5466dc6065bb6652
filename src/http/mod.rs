// HTTP value types shared by every fetch decorator: headers, requests,
// responses with caching predicates, URLs and request context.

pub mod cache_control;
pub mod context;
pub mod date;
pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod status;
pub mod url;

pub use context::{LogRecord, RequestContext};
pub use headers::{names, Headers};
pub use method::Method;
pub use request::RequestHeaders;
pub use response::{CachingSummary, ResponseHeaders, DEFAULT_IMPLICIT_CACHE_TTL_MS};
pub use url::{FetchUrl, UrlError};

#[cfg(test)]
mod headers_test;
#[cfg(test)]
mod response_test;
