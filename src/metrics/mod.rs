//! Statistics registry and the variable names each component publishes.

pub mod names;
pub mod statistics;

pub use statistics::{Histogram, Statistics, Variable};
