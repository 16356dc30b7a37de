//! Recovery of events lost between a settlement write and its webhook.
//!
//! Settlement persists the terminal status and then records the webhook log
//! in a separate step. A crash in between leaves a settled record that never
//! notifies the merchant. The sweep finds such records and emits their event.

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use crate::error::JobError;
use crate::models::payment::PaymentStatus;
use crate::models::webhook::EventType;
use crate::queue::JobQueue;
use crate::services::webhook_service;
use crate::store::Store;

/// Records settled more recently than this are left to their worker.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60);

/// Upper bound of records re-emitted per resource kind and sweep.
const BATCH_SIZE: i64 = 500;

/// Number of events re-emitted by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub payments: usize,
    pub refunds: usize,
}

/// Emit the missing webhook for every settled payment or processed refund
/// older than `grace` that has no webhook log.
pub async fn reconcile_missing_webhooks(
    store: &dyn Store,
    queue: &dyn JobQueue,
    grace: Duration,
) -> Result<ReconcileReport, JobError> {
    let cutoff = Utc::now() - TimeDelta::from_std(grace).unwrap_or(TimeDelta::zero());
    let mut report = ReconcileReport::default();

    for payment in store.unannounced_payments(cutoff, BATCH_SIZE).await? {
        let event = if payment.status == PaymentStatus::Success.as_str() {
            EventType::PaymentSuccess
        } else {
            EventType::PaymentFailed
        };
        webhook_service::emit_event(
            store,
            queue,
            payment.merchant_id,
            &payment.id,
            event,
            "payment",
            &payment,
        )
        .await?;
        report.payments += 1;
    }

    for refund in store.unannounced_refunds(cutoff, BATCH_SIZE).await? {
        webhook_service::emit_event(
            store,
            queue,
            refund.merchant_id,
            &refund.id,
            EventType::RefundProcessed,
            "refund",
            &refund,
        )
        .await?;
        report.refunds += 1;
    }

    if report != ReconcileReport::default() {
        tracing::warn!(
            payments = report.payments,
            refunds = report.refunds,
            "re-emitted missing webhook events"
        );
    }
    Ok(report)
}
