use std::sync::Arc;

use app_sim::{SimConfig, SimFactory};
use query_engine::{Predicate, QueryEngine, Selector};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use trellis_command_queue::{Cy, EngineConfig, Subject, TestContext};
use trellis_core_types::StaticResponse;

async fn start(factory: &SimFactory) -> TestContext {
    TestContext::start(
        "account flow",
        EngineConfig::default(),
        Arc::new(QueryEngine::default()),
        factory,
        &CancellationToken::new(),
    )
    .await
    .unwrap()
}

fn cy_attr(value: &str) -> Selector {
    Selector::attr("data-cy", value)
}

#[tokio::test(start_paused = true)]
async fn real_then_intercepted_messages() {
    let factory = SimFactory::new(SimConfig::default());
    let mut ctx = start(&factory).await;

    let mut cy = Cy::new();
    cy.visit("/account");
    cy.get(cy_attr("GetRealData")).click();
    cy.get(cy_attr("DataDisplay"))
        .should(Predicate::contain_text("I made it!"));
    cy.intercept_reply(
        "GET",
        "http://localhost:3000/posts/1/messages",
        StaticResponse::ok(json!({ "success": "Intercepted data" })),
    )
    .alias("interceptedRequest");
    cy.get(cy_attr("GetInterceptedData")).click();
    cy.wait("@interceptedRequest");
    cy.get(cy_attr("DataDisplay"))
        .should(Predicate::contain_text("Intercepted data"));

    cy.into_queue().run(&mut ctx).await.unwrap();

    let stats = ctx.layer().stats();
    assert_eq!(stats.stubbed, 1);
    assert_eq!(stats.unmatched, 1);
}

#[tokio::test(start_paused = true)]
async fn spy_route_yields_the_real_record() {
    let factory = SimFactory::default();
    let mut ctx = start(&factory).await;

    let mut cy = Cy::new();
    cy.intercept("GET", "/posts/*/messages").alias("messages");
    cy.visit("/account");
    cy.get(cy_attr("GetRealData")).click();
    cy.wait("@messages");

    let outcome = cy.into_queue().run(&mut ctx).await.unwrap();
    match outcome.subject {
        Subject::Call(record) => {
            assert!(!record.stubbed);
            assert_eq!(
                record.response.as_ref().map(|r| &r.body),
                Some(&json!({ "success": "I made it!" }))
            );
        }
        other => panic!("unexpected subject {other:?}"),
    }
}
