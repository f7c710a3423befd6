//! Boundary to the application under test.

use std::sync::Arc;

use async_trait::async_trait;
use net_intercept::{NetworkChannel, Upstream};
use query_engine::DocumentSource;
use stub_spy::MethodTable;
use trellis_core_types::{ElementId, EngineResult};

/// A running application instance, owned by one test case.
///
/// Element snapshots come from the [`DocumentSource`] supertrait. All network
/// traffic must go through the channel the instance was launched with.
#[async_trait]
pub trait Application: DocumentSource {
    async fn visit(&self, url: &str) -> EngineResult<()>;

    async fn click(&self, element: ElementId) -> EngineResult<()>;

    async fn type_text(&self, element: ElementId, text: &str) -> EngineResult<()>;

    /// Replaceable platform object such as `navigator.geolocation`.
    fn platform_object(&self, path: &str) -> EngineResult<Arc<MethodTable>>;
}

/// Launches a fresh application per test case.
#[async_trait]
pub trait AppFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Real network the channel forwards unmatched calls to.
    fn upstream(&self) -> Arc<dyn Upstream>;

    async fn launch(&self, channel: NetworkChannel) -> EngineResult<Arc<dyn Application>>;
}
