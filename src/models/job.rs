//! Payloads carried by the three work queues.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::{JobPayload, QueueName};

/// Settle a pending payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentJob {
    pub payment_id: String,
}

impl JobPayload for PaymentJob {
    const QUEUE: QueueName = QueueName::Payment;
}

/// Settle a pending refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundJob {
    pub refund_id: String,
}

impl JobPayload for RefundJob {
    const QUEUE: QueueName = QueueName::Refund;
}

/// Deliver the event recorded in a webhook log.
///
/// Retries re-enqueue this exact payload, so every attempt sends the same
/// event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJob {
    pub webhook_log_id: Uuid,
    pub merchant_id: Uuid,
    pub payload: serde_json::Value,
}

impl JobPayload for WebhookJob {
    const QUEUE: QueueName = QueueName::Webhook;
}
