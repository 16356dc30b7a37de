//! Payment data models and API request/response types.
//!
//! This module defines:
//! - `Payment`: Database entity representing a payment
//! - `PaymentOutcome`: Result of settling a pending payment
//! - `CreatePaymentRequest` / `PaymentResponse`: API bodies

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a payment.
///
/// A payment is created `pending` and moves exactly once to `success` or
/// `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
        }
    }

    /// Parse a method name as sent by API clients (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upi" => Some(PaymentMethod::Upi),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

/// Represents a payment record from the database.
///
/// # Database Table
///
/// Maps to the `payments` table. Amounts are stored in minor currency
/// units (paise for INR) as `i64`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Payment {
    /// Public identifier, `pay_` followed by 16 alphanumerics
    pub id: String,

    /// Merchant that created the payment
    pub merchant_id: Uuid,

    /// Merchant-side order reference
    pub order_id: Option<String>,

    /// Amount in minor units, always positive
    pub amount: i64,

    /// Currency code (ISO 4217)
    pub currency: String,

    /// Payment method (`upi` or `card`)
    pub method: String,

    /// Virtual payment address for UPI payments
    pub vpa: Option<String>,

    /// `pending`, `success` or `failed`
    pub status: String,

    /// Only ever true for successful payments
    pub captured: bool,

    /// Set only when status is `failed`
    pub error_code: Option<String>,

    /// Set only when status is `failed`
    pub error_description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending.as_str()
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success.as_str()
    }
}

/// A payment about to be inserted with status `pending`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: String,
    pub merchant_id: Uuid,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub vpa: Option<String>,
}

impl NewPayment {
    pub fn new(
        merchant_id: Uuid,
        amount: i64,
        currency: String,
        method: PaymentMethod,
        order_id: Option<String>,
        vpa: Option<String>,
    ) -> Self {
        Self {
            id: super::generate_id("pay_"),
            merchant_id,
            order_id,
            amount,
            currency,
            method,
            vpa,
        }
    }
}

/// Terminal result decided for a pending payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed { code: String, description: String },
}

impl PaymentOutcome {
    /// Failure reported for a simulated bank rejection.
    pub fn bank_rejected() -> Self {
        PaymentOutcome::Failed {
            code: "PAYMENT_FAILED".to_string(),
            description: "Bank rejected transaction".to_string(),
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            PaymentOutcome::Success => None,
            PaymentOutcome::Failed { code, .. } => Some(code),
        }
    }

    pub fn error_description(&self) -> Option<&str> {
        match self {
            PaymentOutcome::Success => None,
            PaymentOutcome::Failed { description, .. } => Some(description),
        }
    }
}

/// Request to create a payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount": 50000,
///   "currency": "INR",
///   "method": "upi",
///   "order_id": "order_001",
///   "vpa": "user@paytm"
/// }
/// ```
///
/// Fields are optional at the deserialization level so missing values
/// surface as `BAD_REQUEST_ERROR` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub order_id: Option<String>,
    pub vpa: Option<String>,
}

/// Response body for payment endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub vpa: Option<String>,
    pub status: String,
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database Payment to API PaymentResponse.
///
/// Drops the internal `merchant_id`.
impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency,
            method: payment.method,
            vpa: payment.vpa,
            status: payment.status,
            captured: payment.captured,
            error_code: payment.error_code,
            error_description: payment.error_description,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert_eq!(PaymentMethod::parse("UPI"), Some(PaymentMethod::Upi));
        assert_eq!(PaymentMethod::parse(" card "), Some(PaymentMethod::Card));
        assert_eq!(PaymentMethod::parse("netbanking"), None);
    }

    #[test]
    fn failed_outcome_carries_error_details() {
        let outcome = PaymentOutcome::bank_rejected();
        assert_eq!(outcome.status(), PaymentStatus::Failed);
        assert_eq!(outcome.error_code(), Some("PAYMENT_FAILED"));
        assert_eq!(outcome.error_description(), Some("Bank rejected transaction"));
        assert_eq!(PaymentOutcome::Success.error_code(), None);
    }
}
