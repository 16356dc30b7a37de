//! Refund service - validation and creation of refunds.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::RefundJob;
use crate::models::refund::{CreateRefundRequest, NewRefund, Refund};
use crate::queue::{EnqueueOptions, JobQueue, dispatch};
use crate::store::{RefundDecision, Store};

/// Create a pending refund against a successful payment and enqueue it.
///
/// # Process
///
/// 1. Validate the amount is positive
/// 2. Check ownership, payment status and refundable balance and insert,
///    atomically with respect to other refunds of the payment
/// 3. Enqueue a refund job
///
/// # Errors
///
/// - `NotFound`: unknown payment or owned by another merchant
/// - `BadRequest`: payment not successful, or the refund would exceed the
///   remaining refundable amount. Nothing is written in that case.
pub async fn create_refund(
    store: &dyn Store,
    queue: &dyn JobQueue,
    merchant_id: Uuid,
    payment_id: &str,
    request: CreateRefundRequest,
) -> Result<Refund, AppError> {
    let amount = request
        .amount
        .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "amount must be a positive integer".to_string(),
        ));
    }

    let refund = NewRefund::new(payment_id.to_string(), merchant_id, amount, request.reason);
    let refund = match store.create_refund(refund).await? {
        RefundDecision::Created(refund) => refund,
        RefundDecision::PaymentNotFound => return Err(AppError::NotFound("Payment")),
        RefundDecision::PaymentNotRefundable => {
            return Err(AppError::BadRequest(
                "Payment not in refundable state".to_string(),
            ));
        }
        RefundDecision::ExceedsRefundable { available } => {
            tracing::debug!(payment_id, amount, available, "refund rejected");
            return Err(AppError::BadRequest(
                "Refund amount exceeds available amount".to_string(),
            ));
        }
    };

    let job_id = dispatch(
        queue,
        &RefundJob {
            refund_id: refund.id.clone(),
        },
        EnqueueOptions::immediate(),
    )
    .await?;

    tracing::info!(refund_id = %refund.id, payment_id, %job_id, amount, "refund created");
    Ok(refund)
}

/// Fetch a refund owned by the merchant.
pub async fn get_refund(
    store: &dyn Store,
    merchant_id: Uuid,
    refund_id: &str,
) -> Result<Refund, AppError> {
    store
        .get_refund(refund_id)
        .await?
        .filter(|refund| refund.merchant_id == merchant_id)
        .ok_or(AppError::NotFound("Refund"))
}
