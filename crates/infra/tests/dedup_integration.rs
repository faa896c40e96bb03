//! Integration tests for request coalescing
//!
//! **Coverage:**
//! - Concurrent identical GETs share one network call and one body
//! - Requests differing only in body are dispatched separately
//! - An error is delivered to every waiter
//! - A joiner that cancels stops its own wait, not the shared request
//! - An originator that cancels leaves the request running for joiners
//! - A joiner's own timeout bounds its wait without touching the breaker
//! - Settled requests are evicted so later calls hit the network again
//!
//! **Infrastructure:**
//! - WireMock HTTP server with response delays to keep requests in flight

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::time::{Duration, Instant};

use serde_json::json;
use tablesync_domain::{ApiConfig, TimeoutPolicy};
use tablesync_infra::{ApiClient, RequestError, RequestOptions};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IN_FLIGHT: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_concurrent_identical_gets_make_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1, "status": "free"}]))
                .set_delay(IN_FLIGHT),
        )
        .expect(1)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let client = support::client_for(&server, context.clone());

    let calls = (0..4).map(|_| client.get("/tables", RequestOptions::new()));
    let results = futures::future::join_all(calls).await;

    for result in results {
        let body = result.expect("request should succeed").expect("not cancelled");
        assert_eq!(body.as_json(), Some(&json!([{"id": 1, "status": "free"}])));
    }
    assert_eq!(context.deduplicator().pending_count(), 0);
}

#[tokio::test]
async fn test_different_bodies_are_not_coalesced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(body_json(json!({"table": 4})))
        .respond_with(ResponseTemplate::new(201).set_delay(IN_FLIGHT))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(body_json(json!({"table": 7})))
        .respond_with(ResponseTemplate::new(201).set_delay(IN_FLIGHT))
        .expect(1)
        .mount(&server)
        .await;

    let client = support::client_for(&server, support::scaled_context());

    let table_four = json!({"table": 4});
    let table_seven = json!({"table": 7});
    let (first, second) = tokio::join!(
        client.post("/orders", &table_four, RequestOptions::new()),
        client.post("/orders", &table_seven, RequestOptions::new()),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_shared_error_reaches_every_waiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(
            ResponseTemplate::new(502)
                .set_body_json(json!({"error": "upstream gone"}))
                .set_delay(IN_FLIGHT),
        )
        .expect(1)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let client = support::client_for(&server, context.clone());

    let (first, second) = tokio::join!(
        client.get("/inventory", RequestOptions::new()),
        client.get("/inventory", RequestOptions::new()),
    );

    for result in [first, second] {
        match result {
            Err(RequestError::Http { status, message, .. }) => {
                assert_eq!(status.as_u16(), 502);
                assert_eq!(message, "upstream gone");
            }
            other => panic!("expected shared HTTP error, got {other:?}"),
        }
    }
    // One dispatched call, one recorded failure.
    assert_eq!(context.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn test_joiner_cancel_does_not_abort_originator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/open"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"count": 3})).set_delay(IN_FLIGHT),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = support::client_for(&server, support::scaled_context());
    let joiner_token = CancellationToken::new();

    let originator = client.get("/orders/open", RequestOptions::new());
    let joiner = async {
        let options = RequestOptions::new().cancel_token(joiner_token.clone());
        client.get("/orders/open", options).await
    };
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        joiner_token.cancel();
    };

    let (originator, joiner, ()) = tokio::join!(originator, joiner, canceller);

    assert_eq!(joiner.unwrap(), None, "cancelled joiner resolves to no result");
    let body = originator.unwrap().expect("originator still gets the body");
    assert_eq!(body.as_json(), Some(&json!({"count": 3})));
}

#[tokio::test]
async fn test_settled_request_is_dispatched_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/menu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": 12})))
        .expect(2)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let client = support::client_for(&server, context.clone());

    client.get("/menu", RequestOptions::new()).await.unwrap();
    assert_eq!(context.deduplicator().pending_count(), 0);
    client.get("/menu", RequestOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_originator_cancel_does_not_abort_joiners() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stock"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"flour": 8})).set_delay(IN_FLIGHT),
        )
        .expect(1)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let client = support::client_for(&server, context.clone());
    let originator_token = CancellationToken::new();

    let originator = async {
        let options = RequestOptions::new().cancel_token(originator_token.clone());
        client.get("/stock", options).await
    };
    let joiner = async {
        // Let the originator register first.
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.get("/stock", RequestOptions::new()).await
    };
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        originator_token.cancel();
    };

    let (originator, joiner, ()) = tokio::join!(originator, joiner, canceller);

    assert_eq!(originator.unwrap(), None, "cancelled originator resolves to no result");
    let body = joiner.unwrap().expect("joiner still gets the body");
    assert_eq!(body.as_json(), Some(&json!({"flour": 8})));
    assert_eq!(context.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_joiner_timeout_bounds_its_own_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"done": true}))
                .set_delay(Duration::from_millis(1_500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let client = support::client_for(&server, context.clone());

    let originator = client.get("/slow", RequestOptions::new());
    let joiner = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        let options = RequestOptions::new().timeout(Duration::from_millis(50));
        let result = client.get("/slow", options).await;
        (result, started.elapsed())
    };

    let (originator, (joined, waited)) = tokio::join!(originator, joiner);

    assert_eq!(joined.unwrap(), None, "elapsed wait resolves as cancelled by default");
    assert!(waited < Duration::from_millis(500), "joiner waited {waited:?}");
    assert!(originator.unwrap().is_some(), "shared request still completes");
    assert_eq!(context.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_joiner_timeout_under_fail_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(600)))
        .expect(1)
        .mount(&server)
        .await;

    let context = support::scaled_context();
    let config = ApiConfig {
        base_url: format!("{}/api", server.uri()),
        timeout_policy: TimeoutPolicy::Fail,
        ..ApiConfig::default()
    };
    let client = ApiClient::new(&config, context.clone()).expect("api client should be created");

    let originator = client.get("/slow", RequestOptions::new());
    let joiner = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.get("/slow", RequestOptions::new().timeout(Duration::from_millis(50))).await
    };

    let (originator, joined) = tokio::join!(originator, joiner);

    match joined {
        Err(RequestError::Timeout(waited)) => assert_eq!(waited, Duration::from_millis(50)),
        other => panic!("expected joiner timeout, got {other:?}"),
    }
    assert!(originator.is_ok());
    // Only dispatched calls are reported; the joiner's wait is not one.
    assert_eq!(context.breaker().consecutive_failures(), 0);
}
