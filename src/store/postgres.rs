//! PostgreSQL record store.
//!
//! Status transitions are single conditional `UPDATE ... WHERE status = ...
//! RETURNING *` statements; refund creation locks the payment row so
//! concurrent refunds of one payment are validated one after another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    IdempotencyStore, MerchantStore, PaymentStore, RefundDecision, RefundStore, Store, StoreError,
    WebhookLogStore,
};
use crate::db::DbPool;
use crate::models::idempotency::IdempotencyRecord;
use crate::models::merchant::Merchant;
use crate::models::payment::{NewPayment, Payment, PaymentOutcome};
use crate::models::refund::{NewRefund, Refund};
use crate::models::webhook::{DeliveryRecord, NewWebhookLog, WebhookLog, WebhookStatus};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MerchantStore for PgStore {
    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>, StoreError> {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(merchant)
    }

    async fn find_merchant_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let merchant =
            sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE api_key_hash = $1")
                .bind(api_key_hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(merchant)
    }

    async fn update_webhook_settings(
        &self,
        id: Uuid,
        webhook_url: Option<&str>,
        webhook_secret: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let merchant = sqlx::query_as::<_, Merchant>(
            r#"
            UPDATE merchants
            SET webhook_url = $2, webhook_secret = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(webhook_url)
        .bind(webhook_secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(merchant)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, merchant_id, order_id, amount, currency, method, vpa, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(&payment.id)
        .bind(payment.merchant_id)
        .bind(&payment.order_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(&payment.vpa)
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn settle_payment(
        &self,
        id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2,
                error_code = $3,
                error_description = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(outcome.status().as_str())
        .bind(outcome.error_code())
        .bind(outcome.error_description())
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn capture_payment(
        &self,
        id: &str,
        merchant_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET captured = TRUE, updated_at = NOW()
            WHERE id = $1 AND merchant_id = $2 AND status = 'success'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn unannounced_payments(
        &self,
        settled_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.* FROM payments p
            WHERE p.status <> 'pending'
              AND p.updated_at <= $1
              AND NOT EXISTS (SELECT 1 FROM webhook_logs w WHERE w.resource_id = p.id)
            ORDER BY p.updated_at
            LIMIT $2
            "#,
        )
        .bind(settled_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }
}

#[async_trait]
impl RefundStore for PgStore {
    async fn create_refund(&self, refund: NewRefund) -> Result<RefundDecision, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the payment so concurrent refunds see each other's rows
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE id = $1 AND merchant_id = $2 FOR UPDATE",
        )
        .bind(&refund.payment_id)
        .bind(refund.merchant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(payment) = payment else {
            tx.rollback().await?;
            return Ok(RefundDecision::PaymentNotFound);
        };

        if !payment.is_successful() {
            tx.rollback().await?;
            return Ok(RefundDecision::PaymentNotRefundable);
        }

        let refunded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM refunds WHERE payment_id = $1 AND status <> 'failed'",
        )
        .bind(&payment.id)
        .fetch_one(&mut *tx)
        .await?;

        if refund.amount > payment.amount - refunded {
            tx.rollback().await?;
            return Ok(RefundDecision::ExceedsRefundable {
                available: payment.amount - refunded,
            });
        }

        let created = sqlx::query_as::<_, Refund>(
            r#"
            INSERT INTO refunds (id, payment_id, merchant_id, amount, reason, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.payment_id)
        .bind(refund.merchant_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RefundDecision::Created(created))
    }

    async fn get_refund(&self, id: &str) -> Result<Option<Refund>, StoreError> {
        let refund = sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(refund)
    }

    async fn process_refund(&self, id: &str) -> Result<Option<Refund>, StoreError> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE refunds
            SET status = 'processed', processed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    async fn unannounced_refunds(
        &self,
        processed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Refund>, StoreError> {
        let refunds = sqlx::query_as::<_, Refund>(
            r#"
            SELECT r.* FROM refunds r
            WHERE r.status = 'processed'
              AND r.processed_at <= $1
              AND NOT EXISTS (SELECT 1 FROM webhook_logs w WHERE w.resource_id = r.id)
            ORDER BY r.processed_at
            LIMIT $2
            "#,
        )
        .bind(processed_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }
}

#[async_trait]
impl WebhookLogStore for PgStore {
    async fn insert_webhook_log(&self, log: NewWebhookLog) -> Result<WebhookLog, StoreError> {
        let log = sqlx::query_as::<_, WebhookLog>(
            r#"
            INSERT INTO webhook_logs (id, merchant_id, resource_id, event, payload, status, attempts)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0)
            RETURNING *
            "#,
        )
        .bind(log.id)
        .bind(log.merchant_id)
        .bind(&log.resource_id)
        .bind(log.event.as_str())
        .bind(&log.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn get_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>, StoreError> {
        let log = sqlx::query_as::<_, WebhookLog>("SELECT * FROM webhook_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(log)
    }

    async fn begin_delivery_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, StoreError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE webhook_logs
            SET attempts = attempts + 1
            WHERE id = $1 AND status = 'pending' AND attempts < $2
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn record_delivery(&self, id: Uuid, record: &DeliveryRecord) -> Result<(), StoreError> {
        let status = if record.delivered {
            WebhookStatus::Success
        } else {
            WebhookStatus::Pending
        };

        sqlx::query(
            r#"
            UPDATE webhook_logs
            SET last_attempt_at = NOW(),
                response_code = $2,
                response_body = $3,
                status = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(record.response_code)
        .bind(&record.response_body)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_webhook_failed(
        &self,
        id: Uuid,
        response_body: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = 'failed',
                response_body = COALESCE($2, response_body),
                next_retry_at = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn schedule_webhook_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE webhook_logs SET next_retry_at = $2 WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .bind(next_retry_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn reset_webhook_log(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> Result<Option<WebhookLog>, StoreError> {
        let log = sqlx::query_as::<_, WebhookLog>(
            r#"
            UPDATE webhook_logs
            SET status = 'pending', attempts = 0, next_retry_at = NULL
            WHERE id = $1 AND merchant_id = $2 AND status <> 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64), StoreError> {
        let logs = sqlx::query_as::<_, WebhookLog>(
            r#"
            SELECT * FROM webhook_logs
            WHERE merchant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(merchant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_logs WHERE merchant_id = $1")
            .bind(merchant_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((logs, total))
    }
}

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn find_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT * FROM idempotency_keys WHERE key = $1 AND merchant_id = $2",
        )
        .bind(key)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn reserve_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let reserved_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO idempotency_keys (key, merchant_id, response, expires_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (key, merchant_id) DO NOTHING
            RETURNING created_at
            "#,
        )
        .bind(key)
        .bind(merchant_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reserved_at)
    }

    async fn store_idempotent_response(
        &self,
        key: &str,
        merchant_id: Uuid,
        response: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET response = $3
            WHERE key = $1 AND merchant_id = $2 AND response IS NULL
            "#,
        )
        .bind(key)
        .bind(merchant_id)
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        reserved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE key = $1 AND merchant_id = $2 AND response IS NULL AND created_at = $3
            "#,
        )
        .bind(key)
        .bind(merchant_id)
        .bind(reserved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_expired_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM idempotency_keys WHERE key = $1 AND merchant_id = $2 AND expires_at <= $3",
        )
        .bind(key)
        .bind(merchant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
