//! Refund data models and API request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a refund.
///
/// The simulated refund path only ever produces `processed`; `failed` exists
/// in the schema and is excluded from the refundable-balance sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processed => "processed",
            RefundStatus::Failed => "failed",
        }
    }
}

/// Represents a refund record from the database.
///
/// Serialized as-is in API responses and webhook payloads.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Refund {
    /// Public identifier, `rfnd_` followed by 16 alphanumerics
    pub id: String,
    pub payment_id: String,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub reason: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn is_pending(&self) -> bool {
        self.status == RefundStatus::Pending.as_str()
    }

    /// Whether the refund counts against the payment's refundable amount.
    pub fn counts_against_payment(&self) -> bool {
        self.status != RefundStatus::Failed.as_str()
    }
}

/// A refund about to be validated and inserted.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub id: String,
    pub payment_id: String,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub reason: Option<String>,
}

impl NewRefund {
    pub fn new(payment_id: String, merchant_id: Uuid, amount: i64, reason: Option<String>) -> Self {
        Self {
            id: super::generate_id("rfnd_"),
            payment_id,
            merchant_id,
            amount,
            reason,
        }
    }
}

/// Request to refund (part of) a successful payment.
///
/// ```json
/// { "amount": 25000, "reason": "Customer requested" }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CreateRefundRequest {
    pub amount: Option<i64>,
    pub reason: Option<String>,
}
