//! Startup sweep for settled records whose event was never recorded.

mod common;

use std::time::Duration;

use payment_gateway_backoffice::models::webhook::EventType;
use payment_gateway_backoffice::queue::QueueName;
use payment_gateway_backoffice::services::reconciliation::{
    ReconcileReport, reconcile_missing_webhooks,
};
use payment_gateway_backoffice::services::webhook_service::emit_event;

use common::{TestApp, successful_payment};

#[tokio::test]
async fn settled_payment_without_log_is_announced_once() {
    let app = TestApp::new().await;
    let payment = successful_payment(&app.store, 7500).await;

    let report = reconcile_missing_webhooks(&app.store, &app.queue, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            payments: 1,
            refunds: 0
        }
    );

    let logs = app.store.webhook_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource_id, payment.id);
    assert_eq!(logs[0].event, "payment.success");
    assert_eq!(app.queue.jobs(QueueName::Webhook).await.len(), 1);

    let report = reconcile_missing_webhooks(&app.store, &app.queue, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(app.store.webhook_logs().await.len(), 1);
}

#[tokio::test]
async fn announced_and_recent_records_are_left_alone() {
    let app = TestApp::new().await;
    let announced = successful_payment(&app.store, 100).await;
    emit_event(
        &app.store,
        &app.queue,
        announced.merchant_id,
        &announced.id,
        EventType::PaymentSuccess,
        "payment",
        &announced,
    )
    .await
    .unwrap();
    successful_payment(&app.store, 200).await;

    // the second payment settled inside the grace period
    let report = reconcile_missing_webhooks(&app.store, &app.queue, Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(app.store.webhook_logs().await.len(), 1);
}

#[tokio::test]
async fn pending_payments_are_not_reconciled() {
    let app = TestApp::new().await;
    let (_, _) = app
        .send(
            "POST",
            "/api/v1/payments",
            Some(serde_json::json!({ "amount": 100, "method": "upi" })),
        )
        .await;

    let report = reconcile_missing_webhooks(&app.store, &app.queue, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
}
