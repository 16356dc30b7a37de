//! Queue workers.
//!
//! Each worker implements `JobHandler` for one queue. `Workers::start` runs
//! the three consumers side by side, each with its own concurrency limit,
//! and stops them together through a shared cancellation token.

pub mod payment_worker;
pub mod refund_worker;
pub mod webhook_worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::queue::{ConsumerConfig, JobQueue, QueueName, consume};
use crate::services::reconciliation::{self, DEFAULT_GRACE};
use crate::services::simulator::Simulator;
use crate::store::Store;

pub use payment_worker::PaymentWorker;
pub use refund_worker::RefundWorker;
pub use webhook_worker::{DeliveryConfig, DeliveryError, DeliveryOutcome, WebhookWorker};

/// Settings shared by the three consumers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub payment_concurrency: usize,
    pub refund_concurrency: usize,
    pub webhook_concurrency: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub completed_retention: Duration,
    pub delivery: DeliveryConfig,
}

impl WorkerConfig {
    fn consumer(&self, concurrency: usize) -> ConsumerConfig {
        ConsumerConfig {
            concurrency,
            poll_interval: self.poll_interval,
            visibility_timeout: self.visibility_timeout,
            completed_retention: self.completed_retention,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            payment_concurrency: 5,
            refund_concurrency: 5,
            webhook_concurrency: 10,
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(60),
            completed_retention: Duration::from_secs(3600),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            payment_concurrency: config.payment_worker_concurrency,
            refund_concurrency: config.refund_worker_concurrency,
            webhook_concurrency: config.webhook_worker_concurrency,
            poll_interval: config.poll_interval(),
            visibility_timeout: config.visibility_timeout(),
            completed_retention: config.completed_job_retention(),
            delivery: DeliveryConfig {
                timeout: config.webhook_timeout(),
                schedule: config.retry_schedule(),
            },
        }
    }
}

/// Handles of the running consumers.
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Re-emit lost webhook events, then start the payment, refund and
    /// webhook consumers.
    pub async fn start(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        simulator: Arc<Simulator>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, DeliveryError> {
        if let Err(err) =
            reconciliation::reconcile_missing_webhooks(store.as_ref(), queue.as_ref(), DEFAULT_GRACE)
                .await
        {
            tracing::error!(error = %err, "webhook reconciliation failed");
        }

        let payment = PaymentWorker::new(store.clone(), queue.clone(), simulator.clone());
        let refund = RefundWorker::new(store.clone(), queue.clone(), simulator);
        let webhook = WebhookWorker::new(store, queue.clone(), config.delivery.clone())?;

        let handles = vec![
            consume(
                queue.clone(),
                QueueName::Payment,
                Arc::new(payment),
                config.consumer(config.payment_concurrency),
                shutdown.clone(),
            ),
            consume(
                queue.clone(),
                QueueName::Refund,
                Arc::new(refund),
                config.consumer(config.refund_concurrency),
                shutdown.clone(),
            ),
            consume(
                queue,
                QueueName::Webhook,
                Arc::new(webhook),
                config.consumer(config.webhook_concurrency),
                shutdown,
            ),
        ];

        tracing::info!("workers are listening for jobs");
        Ok(Self { handles })
    }

    /// Wait for every consumer to drain and stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
    }
}
