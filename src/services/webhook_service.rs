//! Webhook service for merchant settings, event emission and manual retries.
//!
//! This module records domain events as webhook logs and hands them to the
//! delivery queue. Delivery itself (signing, POSTing, retry scheduling) is
//! done by `workers::webhook_worker`.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, JobError};
use crate::models::job::WebhookJob;
use crate::models::merchant::WebhookConfig;
use crate::models::webhook::{
    EventType, ListWebhookLogsQuery, NewWebhookLog, WebhookEvent, WebhookLog, WebhookLogPage,
    WebhookRetryResponse, WebhookSettingsRequest,
};
use crate::queue::{EnqueueOptions, JobQueue, dispatch};
use crate::store::Store;

/// Largest page size of the log listing.
const MAX_PAGE_SIZE: i64 = 100;

/// Record an event for the merchant and enqueue its first delivery.
///
/// # Process
///
/// 1. Build `{event, timestamp, data}` with `data = {<key>: record}`
/// 2. Insert the webhook log (pending, attempts 0) holding that payload
/// 3. Enqueue a delivery job referencing the log
///
/// The log is written before the job so a delivery never references a
/// missing log. If the process dies between both steps the reconciliation
/// sweep re-emits the event.
pub async fn emit_event<T: Serialize>(
    store: &dyn Store,
    queue: &dyn JobQueue,
    merchant_id: Uuid,
    resource_id: &str,
    event: EventType,
    key: &str,
    record: &T,
) -> Result<WebhookLog, JobError> {
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), serde_json::to_value(record)?);
    let payload = serde_json::to_value(WebhookEvent::new(event, data.into()))?;

    let log = store
        .insert_webhook_log(NewWebhookLog::new(merchant_id, resource_id, event, payload))
        .await?;

    let job = WebhookJob {
        webhook_log_id: log.id,
        merchant_id,
        payload: log.payload.clone(),
    };
    dispatch(queue, &job, EnqueueOptions::immediate()).await?;

    tracing::info!(
        webhook_log_id = %log.id,
        %event,
        resource_id,
        "webhook event recorded"
    );
    Ok(log)
}

/// Update the merchant's webhook destination.
///
/// # Rules
///
/// - A missing or blank URL disables delivery
/// - A present URL must pass `validate_webhook_url`
/// - A missing secret is replaced by a freshly generated one
pub async fn update_settings(
    store: &dyn Store,
    merchant_id: Uuid,
    request: WebhookSettingsRequest,
) -> Result<WebhookConfig, AppError> {
    let webhook_url = request
        .webhook_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    if let Some(url) = &webhook_url {
        validate_webhook_url(url)?;
    }

    let webhook_secret = request
        .webhook_secret
        .map(|secret| secret.trim().to_string())
        .filter(|secret| !secret.is_empty())
        .unwrap_or_else(generate_secret);

    let merchant = store
        .update_webhook_settings(merchant_id, webhook_url.as_deref(), &webhook_secret)
        .await?
        .ok_or(AppError::NotFound("Merchant"))?;

    tracing::info!(%merchant_id, enabled = merchant.delivery_url().is_some(), "webhook settings updated");
    Ok(WebhookConfig::from(merchant))
}

/// Page through the merchant's webhook logs, newest first.
pub async fn list_logs(
    store: &dyn Store,
    merchant_id: Uuid,
    query: ListWebhookLogsQuery,
) -> Result<WebhookLogPage, AppError> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let merchant = store
        .get_merchant(merchant_id)
        .await?
        .ok_or(AppError::NotFound("Merchant"))?;
    let (data, total) = store.list_webhook_logs(merchant_id, limit, offset).await?;

    Ok(WebhookLogPage {
        data,
        total,
        config: WebhookConfig::from(merchant),
        limit,
        offset,
    })
}

/// Re-arm a terminal webhook log and enqueue an immediate delivery.
///
/// Pending logs are rejected: their delivery chain is still live and a
/// second chain would deliver the event twice.
pub async fn retry_log(
    store: &dyn Store,
    queue: &dyn JobQueue,
    merchant_id: Uuid,
    log_id: Uuid,
) -> Result<WebhookRetryResponse, AppError> {
    let Some(log) = store.reset_webhook_log(log_id, merchant_id).await? else {
        return match store.get_webhook_log(log_id).await? {
            Some(log) if log.merchant_id == merchant_id => Err(AppError::BadRequest(
                "Webhook delivery is still pending".to_string(),
            )),
            _ => Err(AppError::NotFound("Webhook")),
        };
    };

    let job = WebhookJob {
        webhook_log_id: log.id,
        merchant_id,
        payload: log.payload.clone(),
    };
    dispatch(queue, &job, EnqueueOptions::immediate()).await?;

    tracing::info!(webhook_log_id = %log.id, "webhook retry scheduled");
    Ok(WebhookRetryResponse {
        id: log.id,
        status: log.status,
        message: "Webhook retry scheduled".to_string(),
    })
}

/// Generate cryptographically secure random secret.
///
/// # Output
///
/// `whsec_` followed by 64 hex characters (32 random bytes)
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("whsec_{}", hex::encode(bytes))
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
pub fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::BadRequest(
            "Webhook URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::BadRequest("Invalid webhook URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            // Allow HTTP for localhost/127.0.0.1 (testing)
            if matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0") | Some("host.docker.internal")
            ) {
                Ok(())
            } else {
                Err(AppError::BadRequest(
                    "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
                ))
            }
        }
        _ => Err(AppError::BadRequest(
            "Webhook URL must use HTTP or HTTPS".to_string(),
        )),
    }
}
