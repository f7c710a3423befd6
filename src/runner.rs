//! Suite runner
//!
//! Each test case gets a fresh [`TestContext`]: its `before_each` bodies and
//! its own body are enqueued into one queue, the queue runs, and the context
//! is torn down whatever the outcome.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use query_engine::QueryEngine;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trellis_command_queue::{AppFactory, Cy, EngineConfig, TestContext};

use crate::report::{FailureReport, RunReport, SuiteReport, TestOutcome, TestStatus};

/// Enqueues commands for a hook or a test body.
pub type Body = Arc<dyn Fn(&mut Cy) + Send + Sync>;

#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    body: Body,
}

impl TestCase {
    pub fn body(&self) -> &Body {
        &self.body
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// A `describe` block: hooks shared by its tests.
#[derive(Clone)]
pub struct Suite {
    name: String,
    before_each: Vec<Body>,
    tests: Vec<TestCase>,
}

impl Suite {
    pub fn describe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before_each: Vec::new(),
            tests: Vec::new(),
        }
    }

    pub fn before_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Cy) + Send + Sync + 'static,
    {
        self.before_each.push(Arc::new(hook));
        self
    }

    pub fn it<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Cy) + Send + Sync + 'static,
    {
        self.tests.push(TestCase {
            name: name.into(),
            body: Arc::new(body),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Hooks first, then the test body, all in one queue.
    pub fn build(&self, test: &TestCase) -> Cy {
        let mut cy = Cy::new();
        for hook in &self.before_each {
            hook(&mut cy);
        }
        (test.body)(&mut cy);
        cy
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("hooks", &self.before_each.len())
            .field("tests", &self.tests)
            .finish()
    }
}

/// Selects which suites and tests run. Matching is case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    pub suite: Option<String>,
    pub grep: Option<String>,
}

impl TestFilter {
    pub fn includes_suite(&self, suite: &str) -> bool {
        match &self.suite {
            Some(wanted) => suite.to_lowercase().contains(&wanted.to_lowercase()),
            None => true,
        }
    }

    /// `grep` is matched against the full title, `"<suite> <test>"`.
    pub fn includes(&self, suite: &str, test: &str) -> bool {
        if !self.includes_suite(suite) {
            return false;
        }
        match &self.grep {
            Some(pattern) => format!("{suite} {test}")
                .to_lowercase()
                .contains(&pattern.to_lowercase()),
            None => true,
        }
    }
}

pub struct Runner {
    config: EngineConfig,
    engine: Arc<QueryEngine>,
    factory: Arc<dyn AppFactory>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: EngineConfig, factory: Arc<dyn AppFactory>) -> Self {
        Self {
            config,
            engine: Arc::new(QueryEngine::default()),
            factory,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<QueryEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Cancelling this token aborts in-flight retries and skips the tests
    /// that have not started yet.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, suites: &[Suite], filter: &TestFilter) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut reports = Vec::new();
        for suite in suites.iter().filter(|s| filter.includes_suite(s.name())) {
            reports.push(self.run_suite(suite, filter).await);
        }
        RunReport::new(started_at, clock.elapsed(), reports)
    }

    pub async fn run_suite(&self, suite: &Suite, filter: &TestFilter) -> SuiteReport {
        info!(suite = suite.name(), "running suite");
        let clock = Instant::now();
        let mut outcomes = Vec::new();
        for test in suite
            .tests()
            .iter()
            .filter(|t| filter.includes(suite.name(), &t.name))
        {
            outcomes.push(self.run_test(suite, test).await);
        }
        SuiteReport::new(suite.name(), clock.elapsed(), outcomes)
    }

    pub async fn run_test(&self, suite: &Suite, test: &TestCase) -> TestOutcome {
        let mut outcome = TestOutcome::new(suite.name(), &test.name);
        if self.cancel.is_cancelled() {
            outcome.status = TestStatus::Skipped;
            return outcome;
        }

        let clock = Instant::now();
        let title = format!("{} > {}", suite.name(), test.name);
        let mut ctx = match TestContext::start(
            title.as_str(),
            self.config.clone(),
            self.engine.clone(),
            self.factory.as_ref(),
            &self.cancel,
        )
        .await
        {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(test = %title, error = %err, "failed to start test context");
                outcome.status = TestStatus::Failed;
                outcome.failure = Some(FailureReport::setup(&err));
                outcome.duration_ms = clock.elapsed().as_millis() as u64;
                return outcome;
            }
        };

        let queue = suite.build(test).into_queue();
        let result = queue.run(&mut ctx).await;
        outcome.teardown = Some(ctx.teardown());
        outcome.duration_ms = clock.elapsed().as_millis() as u64;

        match result {
            Ok(done) => {
                outcome.status = TestStatus::Passed;
                outcome.commands = done.executed;
                info!(test = %title, duration_ms = outcome.duration_ms, "test passed");
            }
            Err(failure) => {
                outcome.status = if failure.error.root_cause().is_cancelled() {
                    TestStatus::Skipped
                } else {
                    TestStatus::Failed
                };
                outcome.commands = failure.index;
                warn!(test = %title, error = %failure, "test failed");
                outcome.failure = Some(FailureReport::from(&failure));
            }
        }
        outcome
    }
}
