//! HTTP handlers for the webhook dashboard.
//!
//! This module lets merchants configure their webhook destination, inspect
//! delivery logs and re-deliver events that ended in a terminal state.

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::merchant::WebhookConfig;
use crate::models::webhook::{
    ListWebhookLogsQuery, WebhookLogPage, WebhookRetryResponse, WebhookSettingsRequest,
};
use crate::services::webhook_service;

/// Response of a settings update.
#[derive(Debug, Serialize)]
pub struct WebhookSettingsResponse {
    pub success: bool,
    pub message: String,
    pub config: WebhookConfig,
}

/// List webhook delivery logs, newest first.
///
/// # Query Parameters
///
/// - `limit` (default 10, max 100)
/// - `offset` (default 0)
///
/// # Response
///
/// ```json
/// {
///   "data": [ { "id": "...", "event": "payment.success", "status": "success", ... } ],
///   "total": 42,
///   "config": { "webhook_url": "https://...", "webhook_secret": "whsec_..." },
///   "limit": 10,
///   "offset": 0
/// }
/// ```
pub async fn list_webhook_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListWebhookLogsQuery>,
) -> Result<Json<WebhookLogPage>, AppError> {
    let page = webhook_service::list_logs(state.store.as_ref(), auth.merchant_id, query).await?;
    Ok(Json(page))
}

/// Re-deliver a webhook whose log is `success` or `failed`.
///
/// The log is reset to `pending` with zero attempts and delivered again
/// immediately. Pending logs are rejected with 400.
pub async fn retry_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(log_id): Path<Uuid>,
) -> Result<Json<WebhookRetryResponse>, AppError> {
    let response = webhook_service::retry_log(
        state.store.as_ref(),
        state.queue.as_ref(),
        auth.merchant_id,
        log_id,
    )
    .await?;

    Ok(Json(response))
}

/// Update the webhook URL and signing secret.
///
/// # Request Body
///
/// ```json
/// {
///   "webhook_url": "https://merchant.example/hooks",
///   "webhook_secret": "whsec_..."
/// }
/// ```
///
/// A null URL disables delivery. An omitted secret is generated.
pub async fn update_webhook_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<WebhookSettingsRequest>, JsonRejection>,
) -> Result<Json<WebhookSettingsResponse>, AppError> {
    let Json(request) = payload?;
    let config =
        webhook_service::update_settings(state.store.as_ref(), auth.merchant_id, request).await?;

    Ok(Json(WebhookSettingsResponse {
        success: true,
        message: "Webhook settings updated".to_string(),
        config,
    }))
}
