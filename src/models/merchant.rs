//! Merchant model.
//!
//! Merchants authenticate with an API key (stored as a SHA-256 hash) and
//! carry the webhook destination consumed by the delivery worker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identifier of the merchant seeded by the initial migration.
pub const TEST_MERCHANT_ID: Uuid = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440000);

/// API key of the seeded merchant. Only its hash is stored.
pub const TEST_MERCHANT_API_KEY: &str = "key_test_abc123";

/// Represents a merchant record from the database.
///
/// # Database Table
///
/// Maps to the `merchants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    /// SHA-256 hash of the API key (64 hex characters)
    pub api_key_hash: String,

    /// Destination for event notifications. `None` disables delivery.
    pub webhook_url: Option<String>,

    /// HMAC key for the `X-Webhook-Signature` header
    pub webhook_secret: String,

    pub created_at: DateTime<Utc>,
}

impl Merchant {
    /// The merchant inserted by the seed migration, used for in-memory runs.
    pub fn test_merchant() -> Self {
        Self {
            id: TEST_MERCHANT_ID,
            name: "Test Merchant".to_string(),
            email: "test@example.com".to_string(),
            api_key_hash: hash_api_key(TEST_MERCHANT_API_KEY),
            webhook_url: None,
            webhook_secret: "whsec_test_abc123".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Webhook URL, treating blank values as unset.
    pub fn delivery_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Webhook configuration exposed to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
}

impl From<Merchant> for WebhookConfig {
    fn from(merchant: Merchant) -> Self {
        Self {
            webhook_url: merchant.webhook_url,
            webhook_secret: merchant.webhook_secret,
        }
    }
}

/// Hash an API key the way it is stored in `merchants.api_key_hash`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}
