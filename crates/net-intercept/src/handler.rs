//! What a route does with the calls it matches.

use std::fmt;
use std::sync::Arc;

use trellis_core_types::{HttpMethod, HttpResponse, OutboundRequest, StaticResponse};

/// Post-processing applied to a forwarded call's real response.
pub type ResponseMutator = Box<dyn FnOnce(&mut HttpResponse) + Send>;

pub enum RequestAction {
    Reply(StaticResponse),
    /// Forward upstream, optionally rewriting what comes back
    Continue(Option<ResponseMutator>),
}

impl fmt::Debug for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestAction::Reply(response) => f.debug_tuple("Reply").field(response).finish(),
            RequestAction::Continue(mutator) => f
                .debug_tuple("Continue")
                .field(&mutator.as_ref().map(|_| "<mutator>"))
                .finish(),
        }
    }
}

/// Call handed to a dynamic route handler.
///
/// The handler may edit the request, then either [`reply`](Self::reply) with
/// a synthetic response or [`continue_with`](Self::continue_with) a rewrite of
/// the real one. Doing neither forwards the (possibly edited) request as-is.
#[derive(Debug)]
pub struct InterceptedRequest {
    pub request: OutboundRequest,
    action: Option<RequestAction>,
}

impl InterceptedRequest {
    pub fn new(request: OutboundRequest) -> Self {
        Self {
            request,
            action: None,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.request.method
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request.headers.insert(name.into(), value.into());
    }

    pub fn reply(&mut self, response: StaticResponse) {
        self.action = Some(RequestAction::Reply(response));
    }

    pub fn continue_with<F>(&mut self, mutate: F)
    where
        F: FnOnce(&mut HttpResponse) + Send + 'static,
    {
        self.action = Some(RequestAction::Continue(Some(Box::new(mutate))));
    }

    pub fn is_handled(&self) -> bool {
        self.action.is_some()
    }

    pub(crate) fn into_parts(self) -> (OutboundRequest, RequestAction) {
        (
            self.request,
            self.action.unwrap_or(RequestAction::Continue(None)),
        )
    }
}

pub type DynamicHandler = Arc<dyn Fn(&mut InterceptedRequest) + Send + Sync>;

#[derive(Clone)]
pub enum RouteHandler {
    Static(StaticResponse),
    Dynamic(DynamicHandler),
}

impl RouteHandler {
    pub fn reply(response: StaticResponse) -> Self {
        RouteHandler::Static(response)
    }

    pub fn dynamic<F>(handler: F) -> Self
    where
        F: Fn(&mut InterceptedRequest) + Send + Sync + 'static,
    {
        RouteHandler::Dynamic(Arc::new(handler))
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHandler::Static(response) => f.debug_tuple("Static").field(response).finish(),
            RouteHandler::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unhandled_request_continues_unchanged() {
        let intercepted = InterceptedRequest::new(OutboundRequest::get("/posts/1"));
        assert!(!intercepted.is_handled());
        let (request, action) = intercepted.into_parts();
        assert_eq!(request.url, "/posts/1");
        assert!(matches!(action, RequestAction::Continue(None)));
    }

    #[test]
    fn dynamic_handler_can_edit_then_reply() {
        let handler = RouteHandler::dynamic(|req| {
            req.set_header("x-test", "1");
            req.reply(StaticResponse::ok(json!({"success": "Intercepted data"})));
        });
        let RouteHandler::Dynamic(f) = handler else {
            panic!("expected dynamic handler");
        };
        let mut intercepted = InterceptedRequest::new(OutboundRequest::get("/posts/1"));
        f(&mut intercepted);
        let (request, action) = intercepted.into_parts();
        assert_eq!(request.headers.get("x-test").map(String::as_str), Some("1"));
        match action {
            RequestAction::Reply(response) => assert_eq!(response.status_code, 200),
            other => panic!("unexpected action {other:?}"),
        }
    }
}
