//! Payment settlement worker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::JobError;
use crate::models::job::PaymentJob;
use crate::models::payment::PaymentOutcome;
use crate::models::webhook::EventType;
use crate::queue::{Job, JobHandler, JobQueue};
use crate::services::simulator::Simulator;
use crate::services::webhook_service;
use crate::store::Store;

/// Settles pending payments: pending → success | failed.
pub struct PaymentWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    simulator: Arc<Simulator>,
}

impl PaymentWorker {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, simulator: Arc<Simulator>) -> Self {
        Self {
            store,
            queue,
            simulator,
        }
    }

    /// Settle one payment and emit its event.
    ///
    /// A payment that is no longer pending, before or after the simulated
    /// delay, completes without writing or emitting anything.
    #[instrument(skip_all, fields(payment_id = %job.payment_id))]
    pub async fn process(&self, job: &PaymentJob) -> Result<(), JobError> {
        let payment = self
            .store
            .get_payment(&job.payment_id)
            .await?
            .ok_or_else(|| JobError::not_found("payment", &job.payment_id))?;

        if !payment.is_pending() {
            info!(status = %payment.status, "payment already settled, skipping");
            return Ok(());
        }

        tokio::time::sleep(self.simulator.payment_delay()).await;
        let outcome = self.simulator.payment_outcome(&payment.method);

        let Some(settled) = self.store.settle_payment(&payment.id, &outcome).await? else {
            info!("payment settled concurrently, skipping");
            return Ok(());
        };

        let event = match outcome {
            PaymentOutcome::Success => EventType::PaymentSuccess,
            PaymentOutcome::Failed { .. } => EventType::PaymentFailed,
        };
        info!(status = %settled.status, "payment settled");

        webhook_service::emit_event(
            self.store.as_ref(),
            self.queue.as_ref(),
            settled.merchant_id,
            &settled.id,
            event,
            "payment",
            &settled,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobHandler for PaymentWorker {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.process(&job.decode()?).await
    }
}
