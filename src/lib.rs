//! Trellis runner library
//!
//! Exposes suites, the runner and configuration for the `trellis` binary and
//! for integration testing.

pub mod config;
pub mod report;
pub mod runner;
pub mod suites;

pub use config::{load_config, ConfigError, RunnerConfig};
pub use report::{RunReport, SuiteReport, TestOutcome, TestStatus};
pub use runner::{Runner, Suite, TestCase, TestFilter};
