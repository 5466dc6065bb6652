// Shared test support: mock fetchers, a local origin server and a harness
// wiring the whole pipeline over mock clocks.

pub mod common;
pub mod fetchers;
pub mod harness;
pub mod origin;

pub use common::*;
pub use harness::FetchHarness;
