//! Refund settlement worker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::JobError;
use crate::models::job::RefundJob;
use crate::models::webhook::EventType;
use crate::queue::{Job, JobHandler, JobQueue};
use crate::services::simulator::Simulator;
use crate::services::webhook_service;
use crate::store::Store;

/// Processes pending refunds: pending → processed.
pub struct RefundWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    simulator: Arc<Simulator>,
}

impl RefundWorker {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, simulator: Arc<Simulator>) -> Self {
        Self {
            store,
            queue,
            simulator,
        }
    }

    #[instrument(skip_all, fields(refund_id = %job.refund_id))]
    pub async fn process(&self, job: &RefundJob) -> Result<(), JobError> {
        let refund = self
            .store
            .get_refund(&job.refund_id)
            .await?
            .ok_or_else(|| JobError::not_found("refund", &job.refund_id))?;

        if !refund.is_pending() {
            info!(status = %refund.status, "refund already processed, skipping");
            return Ok(());
        }

        tokio::time::sleep(self.simulator.refund_delay()).await;

        let Some(processed) = self.store.process_refund(&refund.id).await? else {
            info!("refund processed concurrently, skipping");
            return Ok(());
        };
        info!(payment_id = %processed.payment_id, "refund processed");

        webhook_service::emit_event(
            self.store.as_ref(),
            self.queue.as_ref(),
            processed.merchant_id,
            &processed.id,
            EventType::RefundProcessed,
            "refund",
            &processed,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobHandler for RefundWorker {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.process(&job.decode()?).await
    }
}
