use crate::fetch::StringAsyncFetch;
use crate::http::{names, status, FetchUrl, Method, RequestContext, RequestHeaders};
use crate::metrics::{names as stat, Statistics, Variable};
use crate::upstream::UrlAsyncFetcher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMethod {
    #[default]
    Purge,
    Get,
}

impl PurgeMethod {
    fn method(self) -> Method {
        match self {
            PurgeMethod::Purge => Method::Purge,
            PurgeMethod::Get => Method::Get,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurgeOptions {
    /// Empty disables purging.
    pub downstream_cache_purge_prefix: String,
    pub method: PurgeMethod,
    /// Responses rewritten below this percentage get purged.
    pub rewrite_percentage_threshold: u8,
}

/// True for requests this process sent itself to purge a downstream cache.
pub fn is_purge_request(request: &RequestHeaders) -> bool {
    request.lookup1(names::X_PSA_PURGE_REQUEST) == Some("1")
}

pub struct DownstreamCachePurger {
    fetcher: Arc<dyn UrlAsyncFetcher>,
    options: PurgeOptions,
    attempts: Arc<Variable>,
    successes: Arc<Variable>,
}

impl DownstreamCachePurger {
    pub fn new(
        fetcher: Arc<dyn UrlAsyncFetcher>,
        options: PurgeOptions,
        stats: &Statistics,
    ) -> Self {
        Self {
            fetcher,
            options,
            attempts: stats.variable(stat::DOWNSTREAM_CACHE_PURGE_ATTEMPTS),
            successes: stats.variable(stat::SUCCESSFUL_DOWNSTREAM_CACHE_PURGES),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.options.downstream_cache_purge_prefix.is_empty()
    }

    pub fn should_purge(&self, percent_rewritten: u8) -> bool {
        self.is_enabled() && percent_rewritten < self.options.rewrite_percentage_threshold
    }

    /// Downstream URL purging `url`: the prefix followed by its path and query.
    pub fn purge_url(&self, url: &str) -> Option<String> {
        let parsed = FetchUrl::parse(url).ok()?;
        let prefix = self.options.downstream_cache_purge_prefix.trim_end_matches('/');
        Some(format!("{prefix}{}", parsed.path_and_query()))
    }

    /// Issues the purge when `url` was served with too little of it rewritten.
    /// Returns whether a purge request went out.
    pub fn maybe_purge(&self, url: &str, percent_rewritten: u8) -> bool {
        if !self.should_purge(percent_rewritten) {
            return false;
        }
        let Some(target) = self.purge_url(url) else {
            warn!(component = "purge", event = "bad_url", url = %url);
            return false;
        };
        self.attempts.increment();

        let mut request = RequestHeaders::with_method(self.options.method.method());
        request.replace(names::X_PSA_PURGE_REQUEST, "1");
        let successes = self.successes.clone();
        let logged = target.clone();
        let sink = StringAsyncFetch::with_callback(RequestContext::new(), move |r| {
            if r.status() == status::OK {
                successes.increment();
                debug!(component = "purge", event = "purged", url = %logged);
            } else {
                debug!(
                    component = "purge",
                    event = "purge_failed",
                    url = %logged,
                    status = r.status()
                );
            }
        })
        .with_request_headers(request)
        .background(true);
        self.fetcher.fetch(&target, sink.into_sink());
        true
    }
}
