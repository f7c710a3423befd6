use std::time::Duration;

use async_trait::async_trait;
use net_intercept::Upstream;
use serde_json::json;
use tracing::debug;
use trellis_core_types::{EngineError, EngineResult, HttpMethod, HttpResponse, OutboundRequest};
use url::Url;

/// Backend behind the account page.
///
/// `GET /posts/1/messages` answers `{"success": "I made it!"}`; every other
/// request is a 404.
pub struct FakeBackend {
    latency: Duration,
}

impl FakeBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Upstream for FakeBackend {
    async fn send(&self, request: OutboundRequest) -> EngineResult<HttpResponse> {
        let url = Url::parse(&request.url)
            .map_err(|err| EngineError::Network(format!("bad url {}: {err}", request.url)))?;
        tokio::time::sleep(self.latency).await;
        let response = match (request.method, url.path()) {
            (HttpMethod::Get, "/posts/1/messages") => {
                HttpResponse::new(200, json!({ "success": "I made it!" }))
            }
            _ => HttpResponse::new(404, json!({ "error": "not found" })),
        };
        debug!(url = %request.url, status = response.status_code, "backend responded");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn serves_messages_and_404s() {
        let backend = FakeBackend::new(Duration::from_millis(25));
        let ok = backend
            .send(OutboundRequest::get("http://localhost:3000/posts/1/messages"))
            .await
            .unwrap();
        assert_eq!(ok.body, json!({ "success": "I made it!" }));

        let missing = backend
            .send(OutboundRequest::get("http://localhost:3000/posts/2/messages"))
            .await
            .unwrap();
        assert_eq!(missing.status_code, 404);

        assert!(matches!(
            backend.send(OutboundRequest::get("/relative")).await,
            Err(EngineError::Network(_))
        ));
    }
}
