//! Assembly of the full fetch pipeline from configuration.

pub mod async_ops;
pub mod pipeline;

pub use async_ops::AsyncOpTracker;
pub use pipeline::{Pipeline, ORIGIN_STATS_PREFIX};
