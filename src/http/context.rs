//! Per-request context shared by every decorator touching one fetch.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Free-form messages collected while serving a request (certificate
/// rejections, fetch errors) so callers can surface them.
#[derive(Debug, Default)]
pub struct LogRecord {
    messages: Mutex<Vec<String>>,
}

impl LogRecord {
    pub fn log_info(&self, msg: impl Into<String>) {
        self.messages.lock().push(msg.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(needle))
    }
}

#[derive(Debug)]
pub struct RequestContext {
    id: u64,
    authorized_origins: Mutex<HashSet<String>>,
    log_record: LogRecord,
}

impl RequestContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            authorized_origins: Mutex::new(HashSet::new()),
            log_record: LogRecord::default(),
        })
    }

    /// Correlation id, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Marks an origin (`scheme://host[:port]`) as authorized for this session.
    pub fn add_session_authorized_origin(&self, origin: &str) {
        self.authorized_origins.lock().insert(origin.to_ascii_lowercase());
    }

    pub fn is_session_authorized_origin(&self, origin: &str) -> bool {
        self.authorized_origins
            .lock()
            .contains(&origin.to_ascii_lowercase())
    }

    pub fn log_record(&self) -> &LogRecord {
        &self.log_record
    }
}
