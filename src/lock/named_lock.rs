//! Process-local locks identified by name.

use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_128;

/// Receives the outcome of a deferred acquisition: true when the lock is
/// now held by the caller.
pub type LockCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Handle on one named lock. A handle holds the lock at most once; locks
/// held longer than a caller-chosen age may be stolen by another handle.
pub trait NamedLock: Send + Sync {
    fn name(&self) -> &str;

    /// Acquires the lock if it is free. Never waits.
    fn try_lock(&self) -> bool;

    /// Like [`try_lock`](Self::try_lock), but also takes over a lock whose
    /// holder has had it for at least `steal_ms`.
    fn try_lock_steal_old(&self, steal_ms: i64) -> bool;

    /// Waits up to `wait_ms` for the lock, stealing it once its holder has
    /// had it for `steal_ms`. `callback` runs exactly once, from the
    /// scheduler when the outcome is not immediate.
    fn lock_timed_wait_steal_old(&self, wait_ms: i64, steal_ms: i64, callback: LockCallback);

    /// Releases the lock if this handle holds it; a stolen lock stays with
    /// its new holder.
    fn unlock(&self);

    fn held(&self) -> bool;
}

pub trait NamedLockManager: Send + Sync {
    fn create_named_lock(&self, name: &str) -> Arc<dyn NamedLock>;
}

/// Lock name for a cache key.
pub fn lock_name_for_key(key: &str) -> String {
    format!("{}.lock", hex::encode(xxh3_128(key.as_bytes()).to_be_bytes()))
}
