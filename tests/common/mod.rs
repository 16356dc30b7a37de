//! Common test utilities for the back office integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use payment_gateway_backoffice::app::{AppState, router};
use payment_gateway_backoffice::models::merchant::{
    Merchant, TEST_MERCHANT_API_KEY, TEST_MERCHANT_ID, hash_api_key,
};
use payment_gateway_backoffice::models::payment::{NewPayment, Payment, PaymentMethod, PaymentOutcome};
use payment_gateway_backoffice::queue::{InMemoryJobQueue, Job, JobHandler, JobQueue, QueueName};
use payment_gateway_backoffice::services::retry::RetrySchedule;
use payment_gateway_backoffice::services::simulator::{SimulationMode, Simulator};
use payment_gateway_backoffice::store::{InMemoryStore, PaymentStore, Store};
use payment_gateway_backoffice::workers::{DeliveryConfig, PaymentWorker, RefundWorker, WebhookWorker};

/// Second merchant used to check tenant isolation.
pub const OTHER_MERCHANT_API_KEY: &str = "key_test_other999";

/// In-memory backends plus the router built on them.
pub struct TestApp {
    pub store: InMemoryStore,
    pub queue: InMemoryJobQueue,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = InMemoryStore::with_test_merchant().await;
        store.seed_merchant(other_merchant()).await;
        let queue = InMemoryJobQueue::new();

        let state = AppState::new(
            Arc::new(store.clone()) as Arc<dyn Store>,
            Arc::new(queue.clone()) as Arc<dyn JobQueue>,
            true,
        );

        Self {
            store,
            queue,
            router: router(state),
        }
    }

    pub fn store_arc(&self) -> Arc<dyn Store> {
        Arc::new(self.store.clone())
    }

    pub fn queue_arc(&self) -> Arc<dyn JobQueue> {
        Arc::new(self.queue.clone())
    }

    /// Send a request as the test merchant.
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(TEST_MERCHANT_API_KEY, method, uri, body, None).await
    }

    pub async fn send_as(
        &self,
        api_key: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
        idempotency_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self
            .send_raw(api_key, method, uri, body, idempotency_key)
            .await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Send a request and return the raw response body.
    pub async fn send_raw(
        &self,
        api_key: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
        idempotency_key: Option<&str>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Api-Key", api_key)
            .header("Content-Type", "application/json");
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        let body = match body {
            Some(json) => Body::from(serde_json::to_vec(&json).unwrap()),
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }
}

pub fn other_merchant() -> Merchant {
    Merchant {
        id: Uuid::from_u128(0x6f1c2d3e_4b5a_4c6d_8e7f_001122334455),
        name: "Other Merchant".to_string(),
        email: "other@example.com".to_string(),
        api_key_hash: hash_api_key(OTHER_MERCHANT_API_KEY),
        webhook_url: None,
        webhook_secret: "whsec_other".to_string(),
        created_at: chrono::Utc::now(),
    }
}

/// Test-mode simulator without processing delay.
pub fn instant_simulator() -> Arc<Simulator> {
    Arc::new(Simulator::new(SimulationMode::Test, Duration::ZERO))
}

pub fn payment_worker(app: &TestApp, simulator: Arc<Simulator>) -> PaymentWorker {
    PaymentWorker::new(app.store_arc(), app.queue_arc(), simulator)
}

pub fn refund_worker(app: &TestApp) -> RefundWorker {
    RefundWorker::new(app.store_arc(), app.queue_arc(), instant_simulator())
}

pub fn webhook_worker(store: &InMemoryStore, queue: &InMemoryJobQueue) -> WebhookWorker {
    webhook_worker_with_timeout(store, queue, Duration::from_secs(5))
}

pub fn webhook_worker_with_timeout(
    store: &InMemoryStore,
    queue: &InMemoryJobQueue,
    timeout: Duration,
) -> WebhookWorker {
    WebhookWorker::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        DeliveryConfig {
            timeout,
            schedule: RetrySchedule::test(),
        },
    )
    .unwrap()
}

/// Claim the next visible job of `queue_name` and run it to completion.
///
/// Returns `None` when nothing is visible.
pub async fn run_next(
    queue: &InMemoryJobQueue,
    queue_name: QueueName,
    handler: &dyn JobHandler,
) -> Option<Job> {
    let job = queue.claim(queue_name).await.unwrap()?;
    match handler.handle(&job).await {
        Ok(()) => queue.complete(job.id).await.unwrap(),
        Err(err) => queue.fail(job.id, &err.to_string()).await.unwrap(),
    }
    Some(job)
}

/// A settled payment of the test merchant.
pub async fn successful_payment(store: &InMemoryStore, amount: i64) -> Payment {
    let payment = store
        .insert_payment(NewPayment::new(
            TEST_MERCHANT_ID,
            amount,
            "INR".to_string(),
            PaymentMethod::Upi,
            None,
            None,
        ))
        .await
        .unwrap();
    store
        .settle_payment(&payment.id, &PaymentOutcome::Success)
        .await
        .unwrap()
        .unwrap()
}
