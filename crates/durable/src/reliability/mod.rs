//! Reliability patterns for queued work
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff or a fixed schedule

mod retry;

pub use retry::RetryPolicy;
