//! Network interception layer.
//!
//! Applications send their outbound calls through a [`NetworkChannel`]. The
//! channel consults the per-test [`InterceptLayer`]: the most recently
//! registered route whose matcher accepts the call decides whether a
//! synthetic response is returned or the call is forwarded to the real
//! [`Upstream`]. Every matched call is recorded so tests can wait for it.

pub mod channel;
pub mod handler;
pub mod layer;
pub mod matcher;

pub use channel::{NetworkChannel, Upstream};
pub use handler::{InterceptedRequest, RequestAction, ResponseMutator, RouteHandler};
pub use layer::{CallRecord, InterceptLayer, InterceptStats, Ordinal, RouteHandle};
pub use matcher::{MethodPattern, RouteMatcher, UrlPattern, UrlSource};
