//! Deduplicated logging for hot-path failures.
//!
//! Origin fetch errors tend to arrive in bursts of identical messages (a
//! dead host fails every fetch the same way). `err` queues the message
//! without blocking; a background task folds identical messages seen within
//! one window into a single line with a count.

pub mod log_entry;
pub mod sanitizer;

pub use log_entry::{err, start_dedup_logger, WINDOW};

pub(crate) const COMPONENT: &str = "dedlog";
