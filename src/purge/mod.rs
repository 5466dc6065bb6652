//! Purging downstream caches of responses served before rewriting finished.

pub mod purger;


pub use purger::{is_purge_request, DownstreamCachePurger, PurgeMethod, PurgeOptions};
