use std::sync::Arc;
use std::time::Duration;

use net_intercept::{InterceptLayer, NetworkChannel};
use query_engine::QueryEngine;
use serde::Serialize;
use stub_spy::StubRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core_types::{EngineResult, TestCaseId};
use trellis_retry::{RetryConfig, RetryContext};

use crate::alias::AliasTable;
use crate::ports::{AppFactory, Application};

/// Engine settings injected by the runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub base_url: String,
    pub command_timeout: Duration,
    pub poll_interval: Duration,
    /// Budget for `wait` on an aliased route
    pub wait_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            command_timeout: Duration::from_millis(4000),
            poll_interval: Duration::from_millis(50),
            wait_timeout: Duration::from_millis(5000),
        }
    }
}

impl EngineConfig {
    /// Absolute URLs pass through; paths are joined onto `base_url`.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{base}{url}")
        } else {
            format!("{base}/{url}")
        }
    }

    pub fn command_retry(&self, timeout: Option<Duration>) -> RetryConfig {
        RetryConfig::new(timeout.unwrap_or(self.command_timeout), self.poll_interval)
    }

    pub fn wait_retry(&self, timeout: Option<Duration>) -> RetryConfig {
        RetryConfig::new(timeout.unwrap_or(self.wait_timeout), self.poll_interval)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    pub stubs_restored: usize,
    pub routes_cleared: usize,
    pub aliases_dropped: usize,
}

/// Everything one test case owns.
///
/// Created fresh per test and torn down explicitly, so no alias, route or
/// stub outlives the test that made it.
pub struct TestContext {
    id: TestCaseId,
    name: String,
    config: EngineConfig,
    engine: Arc<QueryEngine>,
    layer: Arc<InterceptLayer>,
    stubs: StubRegistry,
    pub(crate) aliases: AliasTable,
    app: Arc<dyn Application>,
    cancel: CancellationToken,
}

impl TestContext {
    /// Build a context and launch the application against a fresh
    /// interception layer. `cancel` is the runner's token; the context
    /// works on a child of it.
    pub async fn start(
        name: impl Into<String>,
        config: EngineConfig,
        engine: Arc<QueryEngine>,
        factory: &dyn AppFactory,
        cancel: &CancellationToken,
    ) -> EngineResult<Self> {
        let name = name.into();
        let layer = Arc::new(InterceptLayer::new());
        let channel = NetworkChannel::new(layer.clone(), factory.upstream());
        let app = factory.launch(channel).await?;
        let id = TestCaseId::new();
        info!(test = %name, id = %id.0, app = factory.name(), "test context started");
        Ok(Self {
            id,
            name,
            config,
            engine,
            layer,
            stubs: StubRegistry::new(),
            aliases: AliasTable::new(),
            app,
            cancel: cancel.child_token(),
        })
    }

    pub fn id(&self) -> &TestCaseId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn layer(&self) -> &Arc<InterceptLayer> {
        &self.layer
    }

    pub fn stubs(&self) -> &StubRegistry {
        &self.stubs
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn command_ctx(&self, timeout: Option<Duration>) -> RetryContext {
        self.config.command_retry(timeout).start(self.cancel.clone())
    }

    pub(crate) fn wait_ctx(&self, timeout: Option<Duration>) -> RetryContext {
        self.config.wait_retry(timeout).start(self.cancel.clone())
    }

    /// Restore stubs, drop routes and aliases, and cancel anything still
    /// polling on this test's behalf.
    pub fn teardown(&mut self) -> TeardownSummary {
        let summary = TeardownSummary {
            stubs_restored: self.stubs.restore_all(),
            routes_cleared: self.layer.route_count(),
            aliases_dropped: self.aliases.clear(),
        };
        self.layer.reset();
        self.cancel.cancel();
        debug!(test = %self.name, ?summary, "test context torn down");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_onto_base() {
        let config = EngineConfig::default();
        assert_eq!(
            config.resolve_url("/account"),
            "http://localhost:3000/account"
        );
        assert_eq!(config.resolve_url("account"), "http://localhost:3000/account");
        assert_eq!(
            config.resolve_url("https://example.test/x"),
            "https://example.test/x"
        );
    }

    #[test]
    fn per_command_timeout_overrides_default() {
        let config = EngineConfig::default();
        assert_eq!(config.command_retry(None).timeout, Duration::from_millis(4000));
        assert_eq!(
            config.command_retry(Some(Duration::from_millis(10))).timeout,
            Duration::from_millis(10)
        );
        assert_eq!(config.wait_retry(None).timeout, Duration::from_millis(5000));
    }
}
