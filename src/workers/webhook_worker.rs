//! Webhook delivery worker.
//!
//! # Delivery state machine
//!
//! Per webhook log:
//!
//! - `pending` (attempts = k) → `success` on a 2xx response
//! - `pending` (attempts = k) → `pending` (attempts = k + 1) with
//!   `next_retry_at` set and a delayed job enqueued, when k + 1 < 5
//! - `pending` (attempts = k) → `failed` after the 5th failed attempt
//! - `pending` → `failed` immediately when the merchant has no URL
//!
//! # Headers Sent
//!
//! - `Content-Type: application/json`
//! - `X-Webhook-Signature: <hex hmac-sha256>`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::header::CONTENT_TYPE;
use tracing::{info, instrument, warn};

use crate::error::JobError;
use crate::models::job::WebhookJob;
use crate::models::webhook::{DeliveryRecord, truncate_response_body};
use crate::queue::{EnqueueOptions, Job, JobHandler, JobQueue, QueueError, dispatch};
use crate::services::retry::{MAX_ATTEMPTS, RetrySchedule};
use crate::services::signature;
use crate::store::Store;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Stored as the response body when the merchant has no destination.
pub const NO_WEBHOOK_URL: &str = "No Webhook URL configured";

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Per-request timeout
    pub timeout: Duration,
    pub schedule: RetrySchedule,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            schedule: RetrySchedule::production(),
        }
    }
}

/// Transport-level failure of a delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// What one delivery job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The receiver answered 2xx
    Delivered { attempts: i32 },
    /// Attempt failed, another one is scheduled
    RetryScheduled { attempts: i32, delay: Duration },
    /// Attempt failed and the budget is spent; the log is `failed`
    Exhausted { attempts: i32 },
    /// Merchant has no webhook URL; the log is `failed`
    NoEndpoint,
    /// The log was already terminal
    Skipped,
}

pub struct WebhookWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl WebhookWorker {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        config: DeliveryConfig,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            store,
            queue,
            client,
            config,
        })
    }

    /// Make one delivery attempt for the job's webhook log.
    ///
    /// # Process
    ///
    /// 1. Load the log (missing is fatal, terminal is a no-op)
    /// 2. Load the merchant; without a URL fail the log, attempts unchanged
    /// 3. Atomically increment the attempts counter
    /// 4. Serialize the payload once, sign those bytes and POST them
    /// 5. Record the response
    /// 6. On failure schedule the next attempt or fail the log
    #[instrument(skip_all, fields(webhook_log_id = %job.webhook_log_id))]
    pub async fn process(&self, job: &WebhookJob) -> Result<DeliveryOutcome, JobError> {
        let log = self
            .store
            .get_webhook_log(job.webhook_log_id)
            .await?
            .ok_or_else(|| JobError::not_found("webhook log", job.webhook_log_id))?;

        if log.is_terminal() {
            info!(status = %log.status, "webhook log already terminal, skipping");
            return Ok(DeliveryOutcome::Skipped);
        }

        let merchant = self
            .store
            .get_merchant(job.merchant_id)
            .await?
            .ok_or_else(|| JobError::not_found("merchant", job.merchant_id))?;

        let Some(url) = merchant.delivery_url() else {
            warn!(merchant_id = %merchant.id, "no webhook url configured");
            self.store
                .mark_webhook_failed(log.id, Some(NO_WEBHOOK_URL))
                .await?;
            return Ok(DeliveryOutcome::NoEndpoint);
        };

        let Some(attempt) = self
            .store
            .begin_delivery_attempt(log.id, MAX_ATTEMPTS)
            .await?
        else {
            // lost a race with another delivery of the same log, or a
            // previous run died after spending the last attempt
            return self.settle_exhausted(job).await;
        };

        let body = serde_json::to_vec(&job.payload)?;
        let signature = signature::sign(&merchant.webhook_secret, &body);

        let record = match self.send(url, body, &signature).await {
            Ok(record) => record,
            Err(err) => {
                warn!(attempt, error = %err, "webhook request failed");
                DeliveryRecord {
                    response_code: None,
                    response_body: Some(truncate_response_body(&err.to_string())),
                    delivered: false,
                }
            }
        };
        self.store.record_delivery(log.id, &record).await?;

        if record.delivered {
            info!(attempt, response_code = ?record.response_code, "webhook delivered");
            return Ok(DeliveryOutcome::Delivered { attempts: attempt });
        }

        let Some(delay) = self.config.schedule.delay_after(attempt) else {
            warn!(attempt, "webhook delivery attempts exhausted");
            self.store.mark_webhook_failed(log.id, None).await?;
            return Ok(DeliveryOutcome::Exhausted { attempts: attempt });
        };

        let next_retry_at =
            Utc::now() + TimeDelta::from_std(delay).map_err(|_| QueueError::InvalidDelay(delay))?;
        self.store
            .schedule_webhook_retry(log.id, next_retry_at)
            .await?;
        dispatch(self.queue.as_ref(), job, EnqueueOptions::delayed(delay)).await?;

        info!(
            attempt,
            response_code = ?record.response_code,
            retry_in_secs = delay.as_secs(),
            "webhook delivery failed, retry scheduled"
        );
        Ok(DeliveryOutcome::RetryScheduled {
            attempts: attempt,
            delay,
        })
    }

    async fn send(
        &self,
        url: &str,
        body: Vec<u8>,
        signature: &str,
    ) -> Result<DeliveryRecord, DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        Ok(DeliveryRecord {
            response_code: Some(i32::from(status.as_u16())),
            response_body: Some(truncate_response_body(&text)),
            delivered: status.is_success(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.config.timeout)
        } else {
            DeliveryError::Transport(err)
        }
    }

    /// Fail a pending log whose attempts budget is already spent.
    async fn settle_exhausted(&self, job: &WebhookJob) -> Result<DeliveryOutcome, JobError> {
        match self.store.get_webhook_log(job.webhook_log_id).await? {
            Some(log) if log.is_pending() && log.attempts >= MAX_ATTEMPTS => {
                self.store.mark_webhook_failed(log.id, None).await?;
                Ok(DeliveryOutcome::Exhausted {
                    attempts: log.attempts,
                })
            }
            _ => Ok(DeliveryOutcome::Skipped),
        }
    }
}

#[async_trait]
impl JobHandler for WebhookWorker {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.process(&job.decode()?).await.map(|_| ())
    }
}
