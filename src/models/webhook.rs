//! Webhook models for event notification and delivery tracking.
//!
//! # Webhook Flow
//!
//! 1. A settlement worker finishes a payment or refund
//! 2. It records a `WebhookLog` (status `pending`, attempts 0) holding the
//!    exact payload to deliver
//! 3. The webhook worker signs the payload with the merchant's secret and
//!    POSTs it, retrying on failure until success or 5 attempts
//! 4. The merchant verifies `X-Webhook-Signature` against the raw body

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::merchant::WebhookConfig;

/// Maximum stored length of a receiver's response body.
pub const RESPONSE_BODY_LIMIT: usize = 1000;

/// Delivery status of a webhook log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Pending,
    Success,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Success => "success",
            WebhookStatus::Failed => "failed",
        }
    }
}

/// Events emitted by the settlement workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "refund.processed")]
    RefundProcessed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PaymentSuccess => "payment.success",
            EventType::PaymentFailed => "payment.failed",
            EventType::RefundProcessed => "refund.processed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook delivery record.
///
/// # Database Table
///
/// Maps to the `webhook_logs` table. One row per emitted event; the
/// delivery worker updates it on every attempt.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub merchant_id: Uuid,

    /// Payment or refund the event describes
    pub resource_id: String,

    pub event: String,

    /// Exact JSON structure delivered to the merchant
    pub payload: serde_json::Value,

    pub status: String,

    /// Delivery attempts made so far (0..=5)
    pub attempts: i32,

    pub response_code: Option<i32>,

    /// Receiver response, truncated to `RESPONSE_BODY_LIMIT` characters
    pub response_body: Option<String>,

    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookLog {
    pub fn is_pending(&self) -> bool {
        self.status == WebhookStatus::Pending.as_str()
    }

    /// `success` and `failed` logs never receive another automatic attempt.
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

/// A webhook log about to be inserted with status `pending`.
#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub resource_id: String,
    pub event: EventType,
    pub payload: serde_json::Value,
}

impl NewWebhookLog {
    pub fn new(
        merchant_id: Uuid,
        resource_id: impl Into<String>,
        event: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            resource_id: resource_id.into(),
            event,
            payload,
        }
    }
}

/// Webhook payload sent to the merchant endpoint.
///
/// # Example
///
/// ```json
/// {
///   "event": "payment.success",
///   "timestamp": 1736937000,
///   "data": {
///     "payment": {
///       "id": "pay_H8sK3jD9s2L1pQr4",
///       "amount": 50000,
///       "currency": "INR",
///       "method": "upi",
///       "status": "success"
///     }
///   }
/// }
/// ```
///
/// # Signature Verification
///
/// `X-Webhook-Signature` carries hex(HMAC-SHA256(secret, raw_body)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: EventType,

    /// Unix seconds at which the event occurred
    pub timestamp: i64,

    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn new(event: EventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now().timestamp(),
            data,
        }
    }
}

/// Result of one delivery attempt, persisted onto the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub delivered: bool,
}

/// Request to update the merchant's webhook destination.
///
/// ```json
/// { "webhook_url": "https://merchant.example/hooks", "webhook_secret": "whsec_..." }
/// ```
///
/// An omitted secret is generated. A null URL disables delivery.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookSettingsRequest {
    #[serde(alias = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(alias = "webhookSecret")]
    pub webhook_secret: Option<String>,
}

/// Query parameters of the webhook log listing.
#[derive(Debug, Deserialize)]
pub struct ListWebhookLogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

/// Page of webhook logs along with the current configuration.
#[derive(Debug, Serialize)]
pub struct WebhookLogPage {
    pub data: Vec<WebhookLog>,
    pub total: i64,
    pub config: WebhookConfig,
    pub limit: i64,
    pub offset: i64,
}

/// Response of a manual retry request.
#[derive(Debug, Serialize)]
pub struct WebhookRetryResponse {
    pub id: Uuid,
    pub status: String,
    pub message: String,
}

/// Cut a receiver's response body down to `RESPONSE_BODY_LIMIT` characters.
pub fn truncate_response_body(body: &str) -> String {
    match body.char_indices().nth(RESPONSE_BODY_LIMIT) {
        Some((end, _)) => body[..end].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_as_dotted_tag() {
        let json = serde_json::to_value(EventType::RefundProcessed).unwrap();
        assert_eq!(json, serde_json::json!("refund.processed"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(RESPONSE_BODY_LIMIT + 10);
        let truncated = truncate_response_body(&long);
        assert_eq!(truncated.chars().count(), RESPONSE_BODY_LIMIT);

        assert_eq!(truncate_response_body("ok"), "ok");
    }
}
