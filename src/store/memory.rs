//! In-memory record store.
//!
//! Every operation takes the table lock once, so the conditional updates and
//! the refund balance check are atomic exactly like their SQL counterparts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    IdempotencyStore, MerchantStore, PaymentStore, RefundDecision, RefundStore, Store, StoreError,
    WebhookLogStore,
};
use crate::models::idempotency::IdempotencyRecord;
use crate::models::merchant::Merchant;
use crate::models::payment::{NewPayment, Payment, PaymentOutcome, PaymentStatus};
use crate::models::refund::{NewRefund, Refund, RefundStatus};
use crate::models::webhook::{DeliveryRecord, NewWebhookLog, WebhookLog, WebhookStatus};

#[derive(Debug, Default)]
struct Tables {
    merchants: HashMap<Uuid, Merchant>,
    payments: HashMap<String, Payment>,
    refunds: Vec<Refund>,
    webhook_logs: Vec<WebhookLog>,
    idempotency_keys: HashMap<(String, Uuid), IdempotencyRecord>,
}

/// Thread-safe in-memory store. Clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the seeded test merchant.
    pub async fn with_test_merchant() -> Self {
        let store = Self::new();
        store.seed_merchant(Merchant::test_merchant()).await;
        store
    }

    pub async fn seed_merchant(&self, merchant: Merchant) {
        self.tables
            .write()
            .await
            .merchants
            .insert(merchant.id, merchant);
    }

    /// Insert or overwrite a payment row as-is.
    pub async fn seed_payment(&self, payment: Payment) {
        self.tables
            .write()
            .await
            .payments
            .insert(payment.id.clone(), payment);
    }

    /// Insert or overwrite a webhook log row as-is.
    pub async fn seed_webhook_log(&self, log: WebhookLog) {
        let mut tables = self.tables.write().await;
        tables.webhook_logs.retain(|existing| existing.id != log.id);
        tables.webhook_logs.push(log);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables.payments.values().cloned().collect();
        payments.sort_by_key(|payment| payment.created_at);
        payments
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.tables.read().await.refunds.clone()
    }

    /// Every webhook log in insertion order.
    pub async fn webhook_logs(&self) -> Vec<WebhookLog> {
        self.tables.read().await.webhook_logs.clone()
    }
}

#[async_trait]
impl MerchantStore for InMemoryStore {
    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>, StoreError> {
        Ok(self.tables.read().await.merchants.get(&id).cloned())
    }

    async fn find_merchant_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .merchants
            .values()
            .find(|merchant| merchant.api_key_hash == api_key_hash)
            .cloned())
    }

    async fn update_webhook_settings(
        &self,
        id: Uuid,
        webhook_url: Option<&str>,
        webhook_secret: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.merchants.get_mut(&id).map(|merchant| {
            merchant.webhook_url = webhook_url.map(str::to_string);
            merchant.webhook_secret = webhook_secret.to_string();
            merchant.clone()
        }))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let now = Utc::now();
        let payment = Payment {
            id: payment.id,
            merchant_id: payment.merchant_id,
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency,
            method: payment.method.as_str().to_string(),
            vpa: payment.vpa,
            status: PaymentStatus::Pending.as_str().to_string(),
            captured: false,
            error_code: None,
            error_description: None,
            created_at: now,
            updated_at: now,
        };

        self.tables
            .write()
            .await
            .payments
            .insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.tables.read().await.payments.get(id).cloned())
    }

    async fn settle_payment(
        &self,
        id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<Option<Payment>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(payment) = tables.payments.get_mut(id).filter(|p| p.is_pending()) else {
            return Ok(None);
        };

        payment.status = outcome.status().as_str().to_string();
        payment.error_code = outcome.error_code().map(str::to_string);
        payment.error_description = outcome.error_description().map(str::to_string);
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn capture_payment(
        &self,
        id: &str,
        merchant_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(payment) = tables
            .payments
            .get_mut(id)
            .filter(|p| p.merchant_id == merchant_id && p.is_successful())
        else {
            return Ok(None);
        };

        payment.captured = true;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn unannounced_payments(
        &self,
        settled_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables
            .payments
            .values()
            .filter(|p| !p.is_pending() && p.updated_at <= settled_before)
            .filter(|p| !tables.webhook_logs.iter().any(|log| log.resource_id == p.id))
            .cloned()
            .collect();

        payments.sort_by_key(|p| p.updated_at);
        payments.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(payments)
    }
}

#[async_trait]
impl RefundStore for InMemoryStore {
    async fn create_refund(&self, refund: NewRefund) -> Result<RefundDecision, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(payment) = tables
            .payments
            .get(&refund.payment_id)
            .filter(|p| p.merchant_id == refund.merchant_id)
        else {
            return Ok(RefundDecision::PaymentNotFound);
        };

        if !payment.is_successful() {
            return Ok(RefundDecision::PaymentNotRefundable);
        }

        let refunded: i64 = tables
            .refunds
            .iter()
            .filter(|r| r.payment_id == payment.id && r.counts_against_payment())
            .map(|r| r.amount)
            .sum();

        if refund.amount > payment.amount - refunded {
            return Ok(RefundDecision::ExceedsRefundable {
                available: payment.amount - refunded,
            });
        }

        let created = Refund {
            id: refund.id,
            payment_id: refund.payment_id,
            merchant_id: refund.merchant_id,
            amount: refund.amount,
            reason: refund.reason,
            status: RefundStatus::Pending.as_str().to_string(),
            created_at: Utc::now(),
            processed_at: None,
        };
        tables.refunds.push(created.clone());

        Ok(RefundDecision::Created(created))
    }

    async fn get_refund(&self, id: &str) -> Result<Option<Refund>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.refunds.iter().find(|r| r.id == id).cloned())
    }

    async fn process_refund(&self, id: &str) -> Result<Option<Refund>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(refund) = tables
            .refunds
            .iter_mut()
            .find(|r| r.id == id && r.is_pending())
        else {
            return Ok(None);
        };

        refund.status = RefundStatus::Processed.as_str().to_string();
        refund.processed_at = Some(Utc::now());
        Ok(Some(refund.clone()))
    }

    async fn unannounced_refunds(
        &self,
        processed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Refund>, StoreError> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<_> = tables
            .refunds
            .iter()
            .filter(|r| r.processed_at.is_some_and(|at| at <= processed_before))
            .filter(|r| r.status == RefundStatus::Processed.as_str())
            .filter(|r| !tables.webhook_logs.iter().any(|log| log.resource_id == r.id))
            .cloned()
            .collect();

        refunds.sort_by_key(|r| r.processed_at);
        refunds.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(refunds)
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryStore {
    async fn insert_webhook_log(&self, log: NewWebhookLog) -> Result<WebhookLog, StoreError> {
        let log = WebhookLog {
            id: log.id,
            merchant_id: log.merchant_id,
            resource_id: log.resource_id,
            event: log.event.as_str().to_string(),
            payload: log.payload,
            status: WebhookStatus::Pending.as_str().to_string(),
            attempts: 0,
            response_code: None,
            response_body: None,
            last_attempt_at: None,
            next_retry_at: None,
            created_at: Utc::now(),
        };

        self.tables.write().await.webhook_logs.push(log.clone());
        Ok(log)
    }

    async fn get_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.webhook_logs.iter().find(|log| log.id == id).cloned())
    }

    async fn begin_delivery_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .webhook_logs
            .iter_mut()
            .find(|log| log.id == id && log.is_pending() && log.attempts < max_attempts)
            .map(|log| {
                log.attempts += 1;
                log.attempts
            }))
    }

    async fn record_delivery(&self, id: Uuid, record: &DeliveryRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(log) = tables
            .webhook_logs
            .iter_mut()
            .find(|log| log.id == id && log.is_pending())
        {
            log.last_attempt_at = Some(Utc::now());
            log.response_code = record.response_code;
            log.response_body = record.response_body.clone();
            if record.delivered {
                log.status = WebhookStatus::Success.as_str().to_string();
            }
        }
        Ok(())
    }

    async fn mark_webhook_failed(
        &self,
        id: Uuid,
        response_body: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(log) = tables
            .webhook_logs
            .iter_mut()
            .find(|log| log.id == id && log.is_pending())
        {
            log.status = WebhookStatus::Failed.as_str().to_string();
            log.next_retry_at = None;
            if let Some(body) = response_body {
                log.response_body = Some(body.to_string());
            }
        }
        Ok(())
    }

    async fn schedule_webhook_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(log) = tables
            .webhook_logs
            .iter_mut()
            .find(|log| log.id == id && log.is_pending())
        {
            log.next_retry_at = Some(next_retry_at);
        }
        Ok(())
    }

    async fn reset_webhook_log(
        &self,
        id: Uuid,
        merchant_id: Uuid,
    ) -> Result<Option<WebhookLog>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .webhook_logs
            .iter_mut()
            .find(|log| log.id == id && log.merchant_id == merchant_id && log.is_terminal())
            .map(|log| {
                log.status = WebhookStatus::Pending.as_str().to_string();
                log.attempts = 0;
                log.next_retry_at = None;
                log.clone()
            }))
    }

    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut logs: Vec<_> = tables
            .webhook_logs
            .iter()
            .filter(|log| log.merchant_id == merchant_id)
            .cloned()
            .collect();
        let total = logs.len() as i64;

        // newest first; insertion order breaks timestamp ties
        logs.reverse();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = logs
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn find_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .idempotency_keys
            .get(&(key.to_string(), merchant_id))
            .cloned())
    }

    async fn reserve_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut tables = self.tables.write().await;
        let slot = (key.to_string(), merchant_id);
        if tables.idempotency_keys.contains_key(&slot) {
            return Ok(None);
        }

        let created_at = Utc::now();
        tables.idempotency_keys.insert(
            slot,
            IdempotencyRecord {
                key: key.to_string(),
                merchant_id,
                response: None,
                expires_at,
                created_at,
            },
        );
        Ok(Some(created_at))
    }

    async fn store_idempotent_response(
        &self,
        key: &str,
        merchant_id: Uuid,
        response: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(record) = tables
            .idempotency_keys
            .get_mut(&(key.to_string(), merchant_id))
            .filter(|record| record.response.is_none())
        {
            record.response = Some(response.to_string());
        }
        Ok(())
    }

    async fn release_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        reserved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = (key.to_string(), merchant_id);
        let releasable = tables
            .idempotency_keys
            .get(&slot)
            .is_some_and(|record| record.response.is_none() && record.created_at == reserved_at);
        if releasable {
            tables.idempotency_keys.remove(&slot);
        }
        Ok(())
    }

    async fn delete_expired_idempotency_key(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = (key.to_string(), merchant_id);
        if tables
            .idempotency_keys
            .get(&slot)
            .is_some_and(|record| record.is_expired(now))
        {
            tables.idempotency_keys.remove(&slot);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
