//! Run reports. Serialisable for `--output json|yaml`, never persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trellis_command_queue::{CommandFailure, QueueMetricsSnapshot, TeardownSummary};
use trellis_core_types::EngineError;
use trellis_retry::metrics::RetryMetricsSnapshot;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct FailureReport {
    /// Zero-based position of the failing command; `None` for setup failures
    pub command_index: Option<usize>,
    pub command: Option<String>,
    pub kind: &'static str,
    pub error: String,
}

impl FailureReport {
    pub fn setup(error: &EngineError) -> Self {
        Self {
            command_index: None,
            command: None,
            kind: error.root_cause().kind(),
            error: error.to_string(),
        }
    }
}

impl From<&CommandFailure> for FailureReport {
    fn from(failure: &CommandFailure) -> Self {
        Self {
            command_index: Some(failure.index),
            command: Some(failure.command.clone()),
            kind: failure.error.root_cause().kind(),
            error: failure.error.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TestOutcome {
    pub suite: String,
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Commands that completed before the test finished or failed
    pub commands: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownSummary>,
}

impl TestOutcome {
    pub(crate) fn new(suite: &str, name: &str) -> Self {
        Self {
            suite: suite.to_string(),
            name: name.to_string(),
            status: TestStatus::Skipped,
            duration_ms: 0,
            commands: 0,
            failure: None,
            teardown: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Totals {
    fn count<'a>(outcomes: impl IntoIterator<Item = &'a TestOutcome>) -> Self {
        let mut totals = Self::default();
        for outcome in outcomes {
            match outcome.status {
                TestStatus::Passed => totals.passed += 1,
                TestStatus::Failed => totals.failed += 1,
                TestStatus::Skipped => totals.skipped += 1,
            }
        }
        totals
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub duration_ms: u64,
    pub totals: Totals,
    pub tests: Vec<TestOutcome>,
}

impl SuiteReport {
    pub(crate) fn new(name: &str, elapsed: Duration, tests: Vec<TestOutcome>) -> Self {
        Self {
            name: name.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            totals: Totals::count(&tests),
            tests,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsReport {
    pub queue: QueueMetricsSnapshot,
    pub retry: RetryMetricsSnapshot,
}

impl MetricsReport {
    pub fn capture() -> Self {
        Self {
            queue: trellis_command_queue::metrics::snapshot(),
            retry: trellis_retry::metrics::snapshot(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub totals: Totals,
    pub suites: Vec<SuiteReport>,
    pub metrics: MetricsReport,
}

impl RunReport {
    pub(crate) fn new(started_at: DateTime<Utc>, elapsed: Duration, suites: Vec<SuiteReport>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            totals: Totals::count(suites.iter().flat_map(|s| s.tests.iter())),
            suites,
            metrics: MetricsReport::capture(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.totals.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.suites
            .iter()
            .flat_map(|s| s.tests.iter())
            .filter(|t| t.status == TestStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: TestStatus) -> TestOutcome {
        TestOutcome {
            status,
            ..TestOutcome::new("suite", "test")
        }
    }

    #[test]
    fn totals_roll_up_to_the_run() {
        let suite = SuiteReport::new(
            "suite",
            Duration::from_millis(12),
            vec![
                outcome(TestStatus::Passed),
                outcome(TestStatus::Failed),
                outcome(TestStatus::Skipped),
            ],
        );
        assert_eq!(suite.totals.total(), 3);

        let run = RunReport::new(Utc::now(), Duration::from_millis(20), vec![suite]);
        assert!(!run.is_success());
        assert_eq!(run.failures().count(), 1);
        assert_eq!(run.totals, Totals { passed: 1, failed: 1, skipped: 1 });
    }

    #[test]
    fn failure_report_names_the_root_cause() {
        let failure = CommandFailure {
            index: 2,
            command: "get [data-cy=\"missing\"]".to_string(),
            error: EngineError::timeout(
                "get",
                100,
                EngineError::assertion("text `a`", "text `b`"),
            ),
        };
        let report = FailureReport::from(&failure);
        assert_eq!(report.command_index, Some(2));
        assert_eq!(report.kind, EngineError::assertion("x", "y").kind());
    }
}
