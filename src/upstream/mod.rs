//! Fetchers that reach origin servers and the decorators stacked directly on
//! top of them.

mod client;
pub mod fetcher;
pub mod header_rewrite;
pub mod inflate;
pub mod network;
pub mod rate_control;
pub mod request;
pub mod stats;
pub mod tls;
pub mod trace;

#[cfg(test)]
mod network_test;



pub use fetcher::{UrlAsyncFetcher, UNSPECIFIED_TIMEOUT_MS};
pub use header_rewrite::{HeaderRewritingFetcher, HeaderRules};
pub use inflate::InflatingFetch;
pub use network::{NetworkFetcher, NetworkFetcherOptions};
pub use rate_control::{RateControlFetcher, RateControlOptions};
pub use request::PRODUCT_TOKEN;
pub use stats::StatsFetcher;
pub use tls::HttpsOptions;
