use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

/// How long a cached creation response is replayed.
pub fn idempotency_ttl() -> TimeDelta {
    TimeDelta::hours(24)
}

/// Cached response for an `Idempotency-Key`, scoped per merchant.
///
/// `response` is `None` while the first request holding the key is still
/// being processed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub merchant_id: Uuid,
    pub response: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
