//! Durable record store.
//!
//! The store is the only shared mutable resource between API handlers and
//! workers. Every cross-request or cross-attempt rule (single status
//! transition, refundable balance, attempts counter, first-writer-wins
//! idempotency) is expressed as a conditional or atomic operation here, never
//! as in-process state.
//!
//! - `postgres`: production implementation on `sqlx`
//! - `memory`: in-process implementation for tests and database-less runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::idempotency::IdempotencyRecord;
use crate::models::merchant::Merchant;
use crate::models::payment::{NewPayment, Payment, PaymentOutcome};
use crate::models::refund::{NewRefund, Refund};
use crate::models::webhook::{DeliveryRecord, NewWebhookLog, WebhookLog};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of an attempt to create a refund.
#[derive(Debug, Clone, PartialEq)]
pub enum RefundDecision {
    Created(Refund),
    PaymentNotFound,
    /// The payment is not in `success` status.
    PaymentNotRefundable,
    /// The refund would push the refunded total past the payment amount.
    ExceedsRefundable { available: i64 },
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>, StoreError>;

    async fn find_merchant_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Merchant>, StoreError>;

    async fn update_webhook_settings(
        &self,
        id: Uuid,
        webhook_url: Option<&str>,
        webhook_secret: &str,
    ) -> Result<Option<Merchant>, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError>;

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, StoreError>;

    /// Move a `pending` payment to the outcome's status.
    ///
    /// Returns `None` without writing when the payment is no longer pending,
    /// so a redelivered settlement job cannot transition it twice.
    async fn settle_payment(
        &self,
        id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<Payment>, StoreError>;

    /// Set `captured` on a successful payment of this merchant.
    ///
    /// Returns `None` when the payment is not in `success` status.
    async fn capture_payment(
        &self,
        id: &str,
        merchant_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Settled payments last updated before `settled_before` that never
    /// produced a webhook log.
    async fn unannounced_payments(
        &self,
        settled_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    /// Validate and insert a refund atomically with respect to other
    /// refunds of the same payment.
    async fn create_refund(&self, refund: NewRefund) -> Result<RefundDecision, StoreError>;

    async fn get_refund(&self, id: &str) -> Result<Option<Refund>, StoreError>;

    /// Move a `pending` refund to `processed`. `None` when it was not pending.
    async fn process_refund(&self, id: &str) -> Result<Option<Refund>, StoreError>;

    /// Processed refunds older than `processed_before` without a webhook log.
    async fn unannounced_refunds(
        &self,
        processed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Refund>, StoreError>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn insert_webhook_log(&self, log: NewWebhookLog) -> Result<WebhookLog, StoreError>;

    async fn get_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>, StoreError>;

    /// Atomically increment `attempts` of a pending log still below
    /// `max_attempts` and return the new value.
    ///
    /// Returns `None` when the log is terminal or already exhausted.
    async fn begin_delivery_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, StoreError>;

    /// Persist the response of the current attempt. A delivered record
    /// moves the log to `success`; otherwise it stays `pending`.
    async fn record_delivery(&self, id: Uuid, record: &DeliveryRecord) -> Result<(), StoreError>;

    /// Move a `pending` log to `failed`, optionally replacing the response
    /// body. Terminal logs are left untouched.
    async fn mark_webhook_failed(
        &self,
        id: Uuid,
        response_body: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn schedule_webhook_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Reset a terminal log of this merchant to `pending` with zero attempts.
    ///
    /// Returns `None` when the log is missing, foreign or still pending.
    async fn reset_webhook_log(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> Result<Option<WebhookLog>, StoreError>;

    /// Newest-first page of a merchant's logs and the merchant's total.
    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64), StoreError>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Insert an in-flight reservation (no response yet) and return its
    /// `created_at`.
    ///
    /// No-op on conflict: returns `None` when the key is already held.
    async fn reserve_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Attach the response to a reservation. Never overwrites a stored one.
    async fn store_idempotent_response(
        &self,
        key: &str,
        merchant_id: Uuid,
        response: &str,
    ) -> Result<(), StoreError>;

    /// Drop the reservation created at `reserved_at` if it has no response.
    ///
    /// A newer reservation of the same key is left alone.
    async fn release_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        reserved_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop the record if it expired at or before `now`.
    async fn delete_expired_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// The full record store shared by the API and the workers.
#[async_trait]
pub trait Store:
    MerchantStore + PaymentStore + RefundStore + WebhookLogStore + IdempotencyStore
{
    /// Check connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}
