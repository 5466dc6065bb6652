//! End-to-end tests for the fetch pipeline.
//!
//! Each case drives the full stack (cache, rate control, stats, locks) over
//! the mock origin and mock clock from [`support`].

mod cases_lock_test;

pub mod support;
