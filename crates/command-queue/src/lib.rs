//! Command queue for Trellis test bodies.
//!
//! A test body enqueues commands through the [`Cy`]/[`Chain`] builder. The
//! queue then runs them strictly one after another against a per-test
//! [`TestContext`], threading each command's [`Subject`] into the next,
//! binding aliases and stopping at the first failure.

pub mod alias;
pub mod command;
pub mod context;
pub mod dsl;
pub mod metrics;
pub mod ports;
pub mod queue;
pub mod subject;

pub use alias::AliasTable;
pub use command::{AliasBinding, Command, CommandKind, ThenFn};
pub use context::{EngineConfig, TeardownSummary, TestContext};
pub use dsl::{Chain, Cy};
pub use metrics::QueueMetricsSnapshot;
pub use ports::{AppFactory, Application};
pub use queue::{CommandFailure, CommandQueue, QueueOutcome};
pub use subject::Subject;
