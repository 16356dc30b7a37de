//! Refund creation rules and authentication over HTTP.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use payment_gateway_backoffice::queue::QueueName;

use common::{OTHER_MERCHANT_API_KEY, TestApp, successful_payment};

#[tokio::test]
async fn over_refund_is_rejected_without_a_row() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 50000).await;
    let uri = format!("/api/v1/payments/{}/refunds", payment.id);

    let (status, _) = app.send("POST", &uri, Some(json!({ "amount": 30000 }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.send("POST", &uri, Some(json!({ "amount": 30000 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST_ERROR");
    assert_eq!(
        body["error"]["description"],
        "Refund amount exceeds available amount"
    );

    // the remaining amount can still be refunded exactly
    let (status, _) = app.send("POST", &uri, Some(json!({ "amount": 20000 }))).await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(app.store.refunds().await.len(), 2);
    assert_eq!(app.queue.jobs(QueueName::Refund).await.len(), 2);
}

#[tokio::test]
async fn maximum_integer_refund_is_rejected() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 50000).await;
    let uri = format!("/api/v1/payments/{}/refunds", payment.id);

    let (status, _) = app.send("POST", &uri, Some(json!({ "amount": 1 }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send("POST", &uri, Some(json!({ "amount": i64::MAX })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["description"],
        "Refund amount exceeds available amount"
    );
    assert_eq!(app.store.refunds().await.len(), 1);
}

#[tokio::test]
async fn concurrent_refunds_never_exceed_the_payment() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 10000).await;
    let uri = format!("/api/v1/payments/{}/refunds", payment.id);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let app = TestApp {
            store: app.store.clone(),
            queue: app.queue.clone(),
            router: app.router.clone(),
        };
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            app.send("POST", &uri, Some(json!({ "amount": 4000 }))).await.0
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() == StatusCode::CREATED {
            created += 1;
        }
    }

    assert_eq!(created, 2);
    let total: i64 = app.store.refunds().await.iter().map(|r| r.amount).sum();
    assert!(total <= payment.amount);
}

#[tokio::test]
async fn pending_payments_are_not_refundable() {
    let app = TestApp::new().await;
    let (_, body) = app
        .send(
            "POST",
            "/api/v1/payments",
            Some(json!({ "amount": 5000, "method": "card" })),
        )
        .await;
    let payment_id = body["id"].as_str().unwrap();

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/payments/{payment_id}/refunds"),
            Some(json!({ "amount": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["description"], "Payment not in refundable state");
    assert!(app.store.refunds().await.is_empty());
}

#[tokio::test]
async fn invalid_refund_amounts_are_rejected() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 5000).await;
    let uri = format!("/api/v1/payments/{}/refunds", payment.id);

    for body in [json!({ "amount": 0 }), json!({ "amount": -5 }), json!({})] {
        let (status, _) = app.send("POST", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert!(app.store.refunds().await.is_empty());
}

#[tokio::test]
async fn other_merchants_cannot_see_or_refund_a_payment() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 5000).await;

    let (status, body) = app
        .send_as(
            OTHER_MERCHANT_API_KEY,
            "GET",
            &format!("/api/v1/payments/{}", payment.id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND_ERROR");

    let (status, _) = app
        .send_as(
            OTHER_MERCHANT_API_KEY,
            "POST",
            &format!("/api/v1/payments/{}/refunds", payment.id),
            Some(json!({ "amount": 100 })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.refunds().await.is_empty());
}

#[tokio::test]
async fn unknown_api_key_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send_as("key_unknown", "GET", "/api/v1/refunds/rfnd_x", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");

    let (status, _) = app
        .send_as(
            "key_unknown",
            "POST",
            "/api/v1/payments",
            Some(json!({ "amount": 100, "method": "upi" })),
            Some("idem"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.payments().await.is_empty());
}
