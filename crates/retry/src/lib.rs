//! Predicate/retry core.
//!
//! Runs a fallible check repeatedly until it succeeds, the context deadline
//! passes, or the owning test run is cancelled. Everything in the engine that
//! has to tolerate eventually-consistent state (queries, assertions,
//! actionability, waiting on network aliases) goes through [`retry_until`].

pub mod context;
pub mod metrics;
mod poll;

pub use context::{RetryConfig, RetryContext};
pub use poll::{pause, retry_until};
