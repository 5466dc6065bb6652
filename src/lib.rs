#[path = "shared/dedlog/mod.rs"]
pub mod dedlog;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod lock;
pub mod metrics;
pub mod purge;
pub mod scheduler;
pub mod shutdown;
pub mod upstream;
pub mod workers;
