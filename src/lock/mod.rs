//! Named locks serializing concurrent builders of one cache entry.

pub mod fetcher;
pub mod mem;
pub mod named_lock;



pub use fetcher::{
    LockFetcher, LockedFetch, SinkLockedFetch, DEFAULT_FETCH_LOCK_TIMEOUT_MS, LOCK_SLACK_MS,
};
pub use mem::MemLockManager;
pub use named_lock::{lock_name_for_key, LockCallback, NamedLock, NamedLockManager};
