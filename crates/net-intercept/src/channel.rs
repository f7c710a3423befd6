use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};
use trellis_core_types::{EngineResult, HttpResponse, OutboundRequest};

use crate::handler::{InterceptedRequest, RequestAction, RouteHandler};
use crate::layer::InterceptLayer;

/// Real destination for calls no route stubs.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> EngineResult<HttpResponse>;
}

/// The only way an application under test reaches the network.
#[derive(Clone)]
pub struct NetworkChannel {
    layer: Arc<InterceptLayer>,
    upstream: Arc<dyn Upstream>,
}

impl NetworkChannel {
    pub fn new(layer: Arc<InterceptLayer>, upstream: Arc<dyn Upstream>) -> Self {
        Self { layer, upstream }
    }

    pub fn layer(&self) -> &Arc<InterceptLayer> {
        &self.layer
    }

    /// Route `request` through the interception layer.
    ///
    /// Unmatched calls go straight upstream and leave no record. Matched
    /// calls are answered by the route's handler (or forwarded when it has
    /// none) and the outcome is appended to the route's log before it is
    /// returned, so a pending wait sees it on its next poll. A forwarded call
    /// whose upstream fails is logged with its error.
    pub async fn fetch(&self, request: OutboundRequest) -> EngineResult<HttpResponse> {
        let Some(selected) = self.layer.select(&request) else {
            trace!(method = %request.method, url = %request.url, "no route matched, forwarding");
            return self.upstream.send(request).await;
        };

        let (request, outcome, stubbed) = match selected.handler {
            None => {
                let outcome = self.upstream.send(request.clone()).await;
                (request, outcome, false)
            }
            Some(RouteHandler::Static(reply)) => (request, Ok(HttpResponse::from(reply)), true),
            Some(RouteHandler::Dynamic(handler)) => {
                let mut intercepted = InterceptedRequest::new(request);
                handler(&mut intercepted);
                match intercepted.into_parts() {
                    (request, RequestAction::Reply(reply)) => {
                        (request, Ok(HttpResponse::from(reply)), true)
                    }
                    (request, RequestAction::Continue(mutate)) => {
                        let mut outcome = self.upstream.send(request.clone()).await;
                        if let (Ok(response), Some(mutate)) = (outcome.as_mut(), mutate) {
                            mutate(response);
                        }
                        (request, outcome, false)
                    }
                }
            }
        };

        match &outcome {
            Ok(response) => debug!(
                route = %selected.route,
                url = %request.url,
                status = response.status_code,
                stubbed,
                "intercepted call"
            ),
            Err(err) => warn!(
                route = %selected.route,
                url = %request.url,
                error = %err,
                "intercepted call failed upstream"
            ),
        }
        self.layer.record(&selected.route, request, &outcome, stubbed);
        outcome
    }
}
