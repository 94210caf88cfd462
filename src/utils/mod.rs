//! Common utilities for the manager

pub mod time;

pub use time::{
    sample_period_nanos,
    MockTimeProvider,
    MonotonicTimeProvider,
    TimeProvider,
};
