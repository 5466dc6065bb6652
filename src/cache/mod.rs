//! HTTP response cache: entry codec, byte stores, freshness rules and the
//! caching fetcher with its revalidation and fallback sinks.

pub mod conditional;
pub mod entry;
pub mod fallback;
pub mod fetcher;
pub mod freshen;
pub mod http_cache;
pub mod policy;
pub mod put;
pub mod store;

#[cfg(test)]
mod entry_test;

#[cfg(test)]
mod store_test;

#[cfg(test)]
mod http_cache_test;


pub use conditional::ConditionalSharedAsyncFetch;
pub use entry::{CacheEntry, EntryError};
pub use fallback::FallbackSharedAsyncFetch;
pub use fetcher::{CacheFetcher, CacheFetcherOptions};
pub use freshen::{AsyncOpHooks, FreshenFetch};
pub use http_cache::{FailureKind, FindResult, HttpCache, RememberTtls};
pub use policy::{CachePolicy, STALE_WARNING};
pub use put::CachePutFetch;
pub use store::{CacheStore, LruStore};
