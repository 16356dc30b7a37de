//! Idempotency-Key handling on payment creation.

mod common;

use axum::http::StatusCode;
use chrono::{TimeDelta, Utc};
use serde_json::json;

use payment_gateway_backoffice::models::merchant::{TEST_MERCHANT_API_KEY, TEST_MERCHANT_ID};
use payment_gateway_backoffice::queue::QueueName;
use payment_gateway_backoffice::store::IdempotencyStore;

use common::{OTHER_MERCHANT_API_KEY, TestApp};

fn payment_body() -> serde_json::Value {
    json!({ "amount": 50000, "currency": "INR", "method": "upi", "vpa": "user@paytm" })
}

#[tokio::test]
async fn repeated_key_replays_the_first_response() {
    let app = TestApp::new().await;

    let (status, first) = app
        .send_raw(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(payment_body()),
            Some("order-42"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // a different body under the same key still replays the cached response
    let (status, second) = app
        .send_raw(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(json!({ "amount": 1, "method": "card" })),
            Some("order-42"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first, second);

    assert_eq!(app.store.payments().await.len(), 1);
    assert_eq!(app.queue.jobs(QueueName::Payment).await.len(), 1);
}

#[tokio::test]
async fn concurrent_requests_with_one_key_create_one_payment() {
    let app = TestApp::new().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = app.router.clone();
        let store = app.store.clone();
        let queue = app.queue.clone();
        handles.push(tokio::spawn(async move {
            let app = TestApp {
                store,
                queue,
                router,
            };
            app.send_raw(
                TEST_MERCHANT_API_KEY,
                "POST",
                "/api/v1/payments",
                Some(payment_body()),
                Some("burst-key"),
            )
            .await
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        bodies.push(body);
    }

    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(app.store.payments().await.len(), 1);
    assert_eq!(app.queue.jobs(QueueName::Payment).await.len(), 1);
}

#[tokio::test]
async fn error_responses_are_not_cached() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send_as(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(json!({ "amount": 0, "method": "upi" })),
            Some("retry-me"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send_as(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(payment_body()),
            Some("retry-me"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 50000);
    assert_eq!(app.store.payments().await.len(), 1);
}

#[tokio::test]
async fn expired_key_runs_the_request_again() {
    let app = TestApp::new().await;
    let expired = Utc::now() - TimeDelta::hours(1);
    app.store
        .reserve_idempotency_key("stale", TEST_MERCHANT_ID, expired)
        .await
        .unwrap();
    app.store
        .store_idempotent_response("stale", TEST_MERCHANT_ID, r#"{"id":"pay_old"}"#)
        .await
        .unwrap();

    let (status, body) = app
        .send_as(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(payment_body()),
            Some("stale"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(body["id"], "pay_old");
    assert_eq!(app.store.payments().await.len(), 1);

    let record = app
        .store
        .find_idempotency_key("stale", TEST_MERCHANT_ID)
        .await
        .unwrap()
        .unwrap();
    assert!(record.expires_at > Utc::now());
    assert!(record.response.unwrap().contains(body["id"].as_str().unwrap()));
}

#[tokio::test]
async fn keys_are_scoped_per_merchant() {
    let app = TestApp::new().await;

    let (_, first) = app
        .send_as(
            TEST_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(payment_body()),
            Some("shared"),
        )
        .await;
    let (status, second) = app
        .send_as(
            OTHER_MERCHANT_API_KEY,
            "POST",
            "/api/v1/payments",
            Some(payment_body()),
            Some("shared"),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(first["id"], second["id"]);
    assert_eq!(app.store.payments().await.len(), 2);
}

#[tokio::test]
async fn requests_without_a_key_always_create() {
    let app = TestApp::new().await;

    for _ in 0..2 {
        let (status, _) = app.send("POST", "/api/v1/payments", Some(payment_body())).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    assert_eq!(app.store.payments().await.len(), 2);
}
