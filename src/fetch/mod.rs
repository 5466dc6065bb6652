//! Streaming fetch sinks: the capability trait, the framework handle that
//! enforces the call protocol, and in-memory collectors.

pub mod async_fetch;
pub mod error;
pub mod sink;
pub mod string_fetch;
pub mod sync_adapter;


pub use async_fetch::{AsyncFetch, ContentLength, FetchState};
pub use error::FetchError;
pub use sink::FetchSink;
pub use string_fetch::{CollectedResponse, StringAsyncFetch};
pub use sync_adapter::SyncFetcherAdapter;

/// Implements the state accessors of an [`AsyncFetch`] that wraps another
/// sink by forwarding them to the [`FetchSink`] in field `$base`.
macro_rules! delegate_state {
    ($base:ident) => {
        fn state(&self) -> &$crate::fetch::FetchState {
            self.$base.state()
        }

        fn state_mut(&mut self) -> &mut $crate::fetch::FetchState {
            self.$base.state_mut()
        }

        fn request_headers(&self) -> &$crate::http::RequestHeaders {
            self.$base.request_headers()
        }

        fn request_headers_mut(&mut self) -> &mut $crate::http::RequestHeaders {
            self.$base.request_headers_mut()
        }
    };
}

pub(crate) use delegate_state;
