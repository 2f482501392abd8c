//! # Retry
//!
//! Backoff strategies and bounded retry of transient failures.
//!
//! ## Modules
//!
//! - [`backoff`] - Delay computation after N consecutive failures
//! - [`policy`] - Retry loop, retryable error kinds and cancellation

/// Backoff strategies.
pub mod backoff;
/// Retry policy and state.
pub mod policy;

pub use backoff::Backoff;
pub use policy::{RetryPolicy, RetryState};
