//! Route registry and call log for one test.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use trellis_core_types::{EngineError, EngineResult, HttpResponse, OutboundRequest, RouteId};
use trellis_retry::{retry_until, RetryContext};

use crate::handler::RouteHandler;
use crate::matcher::{RouteMatcher, UrlSource};

const RECORD_BUS_CAPACITY: usize = 256;

/// One intercepted call, as seen by tests.
#[derive(Clone, Debug, Serialize)]
pub struct CallRecord {
    /// Position among all calls the layer recorded, starting at 1
    pub seq: u64,
    pub route: RouteId,
    pub alias: Option<String>,
    pub request: OutboundRequest,
    /// `None` when a forwarded call failed before a response arrived
    pub response: Option<HttpResponse>,
    /// Upstream failure of a forwarded call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the response was synthetic rather than from upstream
    pub stubbed: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Which recorded call a wait should resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ordinal {
    /// Oldest call not yet returned by a previous `Next` wait
    Next,
    /// The n-th call (1-based) regardless of earlier waits
    Nth(usize),
}

/// Reference to a registered route, returned by [`InterceptLayer::register`].
#[derive(Clone, Debug)]
pub struct RouteHandle {
    pub id: RouteId,
    pub matcher: RouteMatcher,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InterceptStats {
    pub requests: u64,
    pub matched: u64,
    pub stubbed: u64,
    pub forwarded: u64,
    /// Forwarded calls whose upstream failed
    pub failed: u64,
    pub unmatched: u64,
}

struct Route {
    id: RouteId,
    matcher: RouteMatcher,
    handler: Option<RouteHandler>,
    alias: Option<String>,
    log: Vec<Arc<CallRecord>>,
    consumed: usize,
}

/// Route chosen for an outbound call.
pub(crate) struct Selected {
    pub route: RouteId,
    pub handler: Option<RouteHandler>,
}

/// Per-test interception state.
///
/// Registrations are kept in order; when several match a call the most
/// recently registered one wins. Each route keeps its own log of the calls
/// it handled.
pub struct InterceptLayer {
    routes: RwLock<Vec<Route>>,
    seq: AtomicU64,
    stats: Mutex<InterceptStats>,
    bus: broadcast::Sender<Arc<CallRecord>>,
}

impl Default for InterceptLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptLayer {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(RECORD_BUS_CAPACITY);
        Self {
            routes: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            stats: Mutex::new(InterceptStats::default()),
            bus,
        }
    }

    /// Parse `method`/`url` and register a route. `handler: None` spies on
    /// matching calls without altering them.
    pub fn register(
        &self,
        method: &str,
        url: impl Into<UrlSource>,
        handler: Option<RouteHandler>,
    ) -> EngineResult<RouteHandle> {
        let matcher = RouteMatcher::parse(method, &url.into())?;
        Ok(self.register_matcher(matcher, handler))
    }

    pub fn register_matcher(
        &self,
        matcher: RouteMatcher,
        handler: Option<RouteHandler>,
    ) -> RouteHandle {
        let id = RouteId::new();
        info!(route = %id, matcher = %matcher, stubbed = handler.is_some(), "route registered");
        self.routes.write().push(Route {
            id: id.clone(),
            matcher: matcher.clone(),
            handler,
            alias: None,
            log: Vec::new(),
            consumed: 0,
        });
        RouteHandle { id, matcher }
    }

    /// Label calls recorded from now on with `alias`.
    pub fn set_alias(&self, route: &RouteId, alias: &str) -> EngineResult<()> {
        let mut routes = self.routes.write();
        let entry = routes
            .iter_mut()
            .find(|r| &r.id == route)
            .ok_or_else(|| unknown_route(route))?;
        entry.alias = Some(alias.to_string());
        Ok(())
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CallRecord>> {
        self.bus.subscribe()
    }

    pub fn stats(&self) -> InterceptStats {
        self.stats.lock().clone()
    }

    /// Every call recorded for `route`, oldest first.
    pub fn calls(&self, route: &RouteId) -> EngineResult<Vec<Arc<CallRecord>>> {
        let routes = self.routes.read();
        routes
            .iter()
            .find(|r| &r.id == route)
            .map(|r| r.log.clone())
            .ok_or_else(|| unknown_route(route))
    }

    /// Non-blocking lookup of the call `ordinal` refers to. A missing call is
    /// a retryable `NotFound`.
    pub fn try_take(&self, route: &RouteId, ordinal: Ordinal) -> EngineResult<Arc<CallRecord>> {
        let mut routes = self.routes.write();
        let entry = routes
            .iter_mut()
            .find(|r| &r.id == route)
            .ok_or_else(|| unknown_route(route))?;
        match ordinal {
            Ordinal::Next => match entry.log.get(entry.consumed) {
                Some(record) => {
                    entry.consumed += 1;
                    Ok(record.clone())
                }
                None => Err(EngineError::NotFound {
                    selector: format!(
                        "call #{} to {}",
                        entry.consumed + 1,
                        describe_route(entry)
                    ),
                }),
            },
            Ordinal::Nth(0) => Err(EngineError::invalid_subject(
                "wait",
                "call ordinals start at 1",
            )),
            Ordinal::Nth(n) => entry.log.get(n - 1).cloned().ok_or_else(|| {
                EngineError::NotFound {
                    selector: format!("call #{n} to {}", describe_route(entry)),
                }
            }),
        }
    }

    /// Wait until the call `ordinal` refers to has been recorded.
    ///
    /// Calls recorded before the wait started count. The wait is bounded by
    /// `ctx`; on expiry the error is a `Timeout` wrapping the `NotFound` for
    /// the missing call.
    pub async fn wait_for(
        &self,
        route: &RouteId,
        ordinal: Ordinal,
        ctx: &RetryContext,
    ) -> EngineResult<Arc<CallRecord>> {
        let operation = match self.alias_of(route) {
            Some(alias) => format!("wait @{alias}"),
            None => format!("wait route {route}"),
        };
        retry_until(ctx, &operation, || async move { self.try_take(route, ordinal) }).await
    }

    /// Drop all routes and logs.
    pub fn reset(&self) {
        let mut routes = self.routes.write();
        debug!(routes = routes.len(), "resetting interception layer");
        routes.clear();
        *self.stats.lock() = InterceptStats::default();
    }

    fn alias_of(&self, route: &RouteId) -> Option<String> {
        self.routes
            .read()
            .iter()
            .find(|r| &r.id == route)
            .and_then(|r| r.alias.clone())
    }

    pub(crate) fn select(&self, request: &OutboundRequest) -> Option<Selected> {
        self.stats.lock().requests += 1;
        let routes = self.routes.read();
        let selected = routes
            .iter()
            .rev()
            .find(|route| route.matcher.matches(request))
            .map(|route| Selected {
                route: route.id.clone(),
                handler: route.handler.clone(),
            });
        let mut stats = self.stats.lock();
        match &selected {
            Some(_) => stats.matched += 1,
            None => stats.unmatched += 1,
        }
        selected
    }

    pub(crate) fn record(
        &self,
        route: &RouteId,
        request: OutboundRequest,
        outcome: &EngineResult<HttpResponse>,
        stubbed: bool,
    ) -> Option<Arc<CallRecord>> {
        {
            let mut stats = self.stats.lock();
            if stubbed {
                stats.stubbed += 1;
            } else {
                stats.forwarded += 1;
            }
            if outcome.is_err() {
                stats.failed += 1;
            }
        }
        let (response, error) = match outcome {
            Ok(response) => (Some(response.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let mut routes = self.routes.write();
        // The route may have been reset while the call was in flight.
        let entry = routes.iter_mut().find(|r| &r.id == route)?;
        let record = Arc::new(CallRecord {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            route: route.clone(),
            alias: entry.alias.clone(),
            request,
            response,
            error,
            stubbed,
            recorded_at: Utc::now(),
        });
        entry.log.push(record.clone());
        drop(routes);
        debug!(
            seq = record.seq,
            route = %record.route,
            url = %record.request.url,
            status = ?record.response.as_ref().map(|r| r.status_code),
            error = ?record.error,
            stubbed,
            "call recorded"
        );
        let _ = self.bus.send(record.clone());
        Some(record)
    }
}

fn describe_route(route: &Route) -> String {
    match &route.alias {
        Some(alias) => format!("@{alias} ({})", route.matcher),
        None => route.matcher.to_string(),
    }
}

fn unknown_route(route: &RouteId) -> EngineError {
    EngineError::AliasNotFound(format!("route {route}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core_types::StaticResponse;

    fn ok(body: serde_json::Value) -> EngineResult<HttpResponse> {
        Ok(HttpResponse::new(200, body))
    }

    #[test]
    fn last_registration_wins_for_overlapping_matchers() {
        let layer = InterceptLayer::new();
        let broad = layer.register("GET", "/posts/**", None).unwrap();
        let narrow = layer
            .register(
                "GET",
                "/posts/1/messages",
                Some(RouteHandler::reply(StaticResponse::default())),
            )
            .unwrap();

        let request = OutboundRequest::get("http://localhost:3000/posts/1/messages");
        let selected = layer.select(&request).unwrap();
        assert_eq!(selected.route, narrow.id);

        let other = OutboundRequest::get("http://localhost:3000/posts/2/messages");
        assert_eq!(layer.select(&other).unwrap().route, broad.id);
        assert!(layer
            .select(&OutboundRequest::get("http://localhost:3000/users"))
            .is_none());

        let stats = layer.stats();
        assert_eq!((stats.requests, stats.matched, stats.unmatched), (3, 2, 1));
    }

    #[test]
    fn next_ordinal_consumes_in_order() {
        let layer = InterceptLayer::new();
        let route = layer.register("GET", "/a", None).unwrap();
        let request = OutboundRequest::get("http://h/a");
        layer.record(&route.id, request.clone(), &ok(json!(1)), false);
        layer.record(&route.id, request, &ok(json!(2)), false);

        let first = layer.try_take(&route.id, Ordinal::Next).unwrap();
        let second = layer.try_take(&route.id, Ordinal::Next).unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert!(matches!(
            layer.try_take(&route.id, Ordinal::Next),
            Err(EngineError::NotFound { .. })
        ));
        // Explicit ordinals ignore the cursor.
        assert_eq!(layer.try_take(&route.id, Ordinal::Nth(1)).unwrap().seq, 1);
        assert!(layer.try_take(&route.id, Ordinal::Nth(0)).is_err());
    }

    #[test]
    fn alias_is_stamped_on_records() {
        let layer = InterceptLayer::new();
        let route = layer.register("*", "/a", None).unwrap();
        layer.set_alias(&route.id, "interceptedRequest").unwrap();
        let record = layer
            .record(&route.id, OutboundRequest::get("/a"), &ok(json!(null)), true)
            .unwrap();
        assert_eq!(record.alias.as_deref(), Some("interceptedRequest"));
        assert_eq!(layer.calls(&route.id).unwrap().len(), 1);
    }

    #[test]
    fn reset_forgets_routes() {
        let layer = InterceptLayer::new();
        let route = layer.register("GET", "/a", None).unwrap();
        layer.reset();
        assert_eq!(layer.route_count(), 0);
        assert!(matches!(
            layer.calls(&route.id),
            Err(EngineError::AliasNotFound(_))
        ));
        assert!(layer
            .record(&route.id, OutboundRequest::get("/a"), &ok(json!(null)), false)
            .is_none());
    }
}
