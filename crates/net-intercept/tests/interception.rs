use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use net_intercept::{InterceptLayer, NetworkChannel, Ordinal, RouteHandler, Upstream};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use trellis_core_types::{EngineError, EngineResult, HttpResponse, OutboundRequest, StaticResponse};
use trellis_retry::RetryConfig;

const MESSAGES: &str = "http://localhost:3000/posts/1/messages";

struct Backend;

#[async_trait]
impl Upstream for Backend {
    async fn send(&self, _request: OutboundRequest) -> EngineResult<HttpResponse> {
        Ok(HttpResponse::new(200, json!({ "success": "I made it!" })))
    }
}

fn channel() -> NetworkChannel {
    NetworkChannel::new(Arc::new(InterceptLayer::new()), Arc::new(Backend))
}

fn window(ms: u64) -> trellis_retry::RetryContext {
    RetryConfig::new(Duration::from_millis(ms), Duration::from_millis(25))
        .start(CancellationToken::new())
}

fn reply(text: &str) -> Option<RouteHandler> {
    Some(RouteHandler::reply(StaticResponse::ok(
        json!({ "success": text }),
    )))
}

#[tokio::test(start_paused = true)]
async fn wait_registered_before_call_resolves_when_call_arrives() {
    let channel = channel();
    let route = channel
        .layer()
        .register("GET", MESSAGES, reply("Intercepted data"))
        .unwrap();
    channel
        .layer()
        .set_alias(&route.id, "interceptedRequest")
        .unwrap();

    let app = channel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        app.fetch(OutboundRequest::get(MESSAGES)).await.unwrap();
    });

    let record = channel
        .layer()
        .wait_for(&route.id, Ordinal::Next, &window(5000))
        .await
        .unwrap();
    assert_eq!(record.alias.as_deref(), Some("interceptedRequest"));
    assert_eq!(record.response.as_ref().unwrap().body, json!({ "success": "Intercepted data" }));
}

#[tokio::test(start_paused = true)]
async fn call_before_wait_still_counts() {
    let channel = channel();
    let route = channel.layer().register("GET", "/posts/**", None).unwrap();
    channel.fetch(OutboundRequest::get(MESSAGES)).await.unwrap();

    let record = channel
        .layer()
        .wait_for(&route.id, Ordinal::Nth(1), &window(100))
        .await
        .unwrap();
    assert!(!record.stubbed);
    assert_eq!(record.response.as_ref().unwrap().body, json!({ "success": "I made it!" }));
}

#[tokio::test(start_paused = true)]
async fn wait_without_call_times_out() {
    let channel = channel();
    let route = channel.layer().register("GET", MESSAGES, None).unwrap();
    let err = channel
        .layer()
        .wait_for(&route.id, Ordinal::Next, &window(300))
        .await
        .unwrap_err();
    match err {
        EngineError::Timeout { last, waited_ms, .. } => {
            assert!(waited_ms >= 300);
            assert!(matches!(*last, EngineError::NotFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn identical_matchers_prefer_latest_registration() {
    let channel = channel();
    let older = channel
        .layer()
        .register("GET", MESSAGES, reply("first"))
        .unwrap();
    let newer = channel
        .layer()
        .register("GET", MESSAGES, reply("second"))
        .unwrap();

    let response = channel.fetch(OutboundRequest::get(MESSAGES)).await.unwrap();
    assert_eq!(response.body, json!({ "success": "second" }));
    assert!(channel.layer().calls(&older.id).unwrap().is_empty());
    assert_eq!(channel.layer().calls(&newer.id).unwrap().len(), 1);
}

#[tokio::test]
async fn subscribers_observe_records_in_sequence() {
    let channel = channel();
    let mut records = channel.layer().subscribe();
    channel.layer().register("*", "/posts/**", None).unwrap();

    channel.fetch(OutboundRequest::get(MESSAGES)).await.unwrap();
    channel
        .fetch(OutboundRequest::get("http://localhost:3000/posts/2/messages"))
        .await
        .unwrap();

    let first = records.recv().await.unwrap();
    let second = records.recv().await.unwrap();
    assert_eq!((first.seq, second.seq), (1, 2));
    assert_eq!(channel.layer().stats().forwarded, 2);
}

struct Unreachable;

#[async_trait]
impl Upstream for Unreachable {
    async fn send(&self, request: OutboundRequest) -> EngineResult<HttpResponse> {
        Err(EngineError::Network(format!("connection refused: {}", request.url)))
    }
}

#[tokio::test(start_paused = true)]
async fn failed_upstream_call_is_still_logged_for_waits() {
    let channel = NetworkChannel::new(Arc::new(InterceptLayer::new()), Arc::new(Unreachable));
    let route = channel.layer().register("GET", "/posts/**", None).unwrap();

    let err = channel
        .fetch(OutboundRequest::get(MESSAGES))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Network(_)));

    let record = channel
        .layer()
        .wait_for(&route.id, Ordinal::Next, &window(100))
        .await
        .unwrap();
    assert!(record.response.is_none());
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains("connection refused")));

    let stats = channel.layer().stats();
    assert_eq!((stats.forwarded, stats.failed), (1, 1));
}
