//! Idempotency-Key middleware for payment creation.
//!
//! The first request carrying a key reserves it (an insert that is a no-op
//! on conflict) and runs the handler. A `201 Created` body is stored on the
//! reservation and replayed byte-for-byte to every later request with the
//! same key and merchant for 24 hours. Any other outcome releases the
//! reservation so the client may try again.
//!
//! Requests that lose the reservation race poll until the winner stores its
//! response and replay it. A reservation older than the in-flight lease is
//! considered abandoned and taken over.

use std::time::Duration;

use axum::{
    Extension,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::idempotency::idempotency_ttl;
use crate::store::Store;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Age after which an unanswered reservation counts as abandoned.
fn in_flight_lease() -> TimeDelta {
    TimeDelta::seconds(30)
}

/// Interval between checks while another request holds the key.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a request waits for the holder of its key.
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

enum Lookup {
    /// The key is ours, reserved at the given database time; run the handler.
    Reserved(DateTime<Utc>),
    /// A stored response to replay.
    Replay(String),
    /// The store is unavailable; run the handler without caching.
    Unguarded,
    /// The holder did not finish within `WAIT_TIMEOUT`.
    TimedOut,
}

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    let store = state.store.as_ref();
    match acquire(store, &key, auth.merchant_id).await {
        Lookup::Replay(body) => {
            debug!(idempotency_key = %key, "replaying cached response");
            replay(body)
        }
        Lookup::Unguarded => next.run(request).await,
        Lookup::TimedOut => AppError::Conflict(
            "A request with this Idempotency-Key is still being processed".to_string(),
        )
        .into_response(),
        Lookup::Reserved(reserved_at) => {
            let response = next.run(request).await;
            finish(store, &key, auth.merchant_id, reserved_at, response).await
        }
    }
}

async fn acquire(store: &dyn Store, key: &str, merchant_id: Uuid) -> Lookup {
    let deadline = Instant::now() + WAIT_TIMEOUT;

    loop {
        let now = Utc::now();
        let existing = match store.find_idempotency_key(key, merchant_id).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(idempotency_key = %key, error = %err, "idempotency lookup failed");
                return Lookup::Unguarded;
            }
        };

        if let Some(record) = existing {
            if record.is_expired(now) {
                if let Err(err) = store
                    .delete_expired_idempotency_key(key, merchant_id, now)
                    .await
                {
                    warn!(idempotency_key = %key, error = %err, "failed to drop expired key");
                    return Lookup::Unguarded;
                }
            } else if let Some(body) = record.response {
                return Lookup::Replay(body);
            } else if now - record.created_at >= in_flight_lease() {
                warn!(idempotency_key = %key, "taking over abandoned idempotency key");
                if let Err(err) = store
                    .release_idempotency_key(key, merchant_id, record.created_at)
                    .await
                {
                    warn!(idempotency_key = %key, error = %err, "failed to release key");
                    return Lookup::Unguarded;
                }
            } else {
                if Instant::now() >= deadline {
                    return Lookup::TimedOut;
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
                continue;
            }
        }

        match store
            .reserve_idempotency_key(key, merchant_id, now + idempotency_ttl())
            .await
        {
            Ok(Some(reserved_at)) => return Lookup::Reserved(reserved_at),
            // another request won the race; wait for its response
            Ok(None) => continue,
            Err(err) => {
                warn!(idempotency_key = %key, error = %err, "idempotency reservation failed");
                return Lookup::Unguarded;
            }
        }
    }
}

/// Store a `201` body on the reservation, or release it for anything else.
async fn finish(
    store: &dyn Store,
    key: &str,
    merchant_id: Uuid,
    reserved_at: DateTime<Utc>,
    response: Response,
) -> Response {
    if response.status() != StatusCode::CREATED {
        release(store, key, merchant_id, reserved_at).await;
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(idempotency_key = %key, error = %err, "failed to buffer response body");
            release(store, key, merchant_id, reserved_at).await;
            return AppError::Internal(err.to_string()).into_response();
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => {
            if let Err(err) = store
                .store_idempotent_response(key, merchant_id, text)
                .await
            {
                error!(idempotency_key = %key, error = %err, "failed to cache response");
                release(store, key, merchant_id, reserved_at).await;
            }
        }
        Err(_) => release(store, key, merchant_id, reserved_at).await,
    }

    Response::from_parts(parts, Body::from(bytes))
}

async fn release(store: &dyn Store, key: &str, merchant_id: Uuid, reserved_at: DateTime<Utc>) {
    if let Err(err) = store
        .release_idempotency_key(key, merchant_id, reserved_at)
        .await
    {
        error!(idempotency_key = %key, error = %err, "failed to release idempotency key");
    }
}

fn replay(body: String) -> Response {
    let mut response = (StatusCode::CREATED, Bytes::from(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
