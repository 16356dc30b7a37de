//! Payment service - creation, lookup and capture of payments.
//!
//! Payments are created `pending` and settled asynchronously by the payment
//! worker. Creation only validates, persists and enqueues.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::PaymentJob;
use crate::models::payment::{CreatePaymentRequest, NewPayment, Payment, PaymentMethod};
use crate::queue::{EnqueueOptions, JobQueue, dispatch};
use crate::store::Store;

/// Currency applied when the request omits one.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Create a pending payment and enqueue its settlement.
///
/// # Process
///
/// 1. Validate amount (positive) and method (`upi` or `card`)
/// 2. Insert the payment with status `pending`
/// 3. Enqueue a payment job referencing it
///
/// # Errors
///
/// - `BadRequest`: missing or invalid fields
/// - `Store` / `Queue`: infrastructure failure
pub async fn create_payment(
    store: &dyn Store,
    queue: &dyn JobQueue,
    merchant_id: Uuid,
    request: CreatePaymentRequest,
) -> Result<Payment, AppError> {
    let amount = request
        .amount
        .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "amount must be a positive integer".to_string(),
        ));
    }

    let method = request
        .method
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("method is required".to_string()))?;
    let method = PaymentMethod::parse(method)
        .ok_or_else(|| AppError::BadRequest("method must be one of: upi, card".to_string()))?;

    let currency = request
        .currency
        .map(|currency| currency.trim().to_ascii_uppercase())
        .filter(|currency| !currency.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let payment = store
        .insert_payment(NewPayment::new(
            merchant_id,
            amount,
            currency,
            method,
            request.order_id,
            request.vpa,
        ))
        .await?;

    let job_id = dispatch(
        queue,
        &PaymentJob {
            payment_id: payment.id.clone(),
        },
        EnqueueOptions::immediate(),
    )
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        %job_id,
        amount,
        method = method.as_str(),
        "payment created"
    );
    Ok(payment)
}

/// Fetch a payment owned by the merchant.
pub async fn get_payment(
    store: &dyn Store,
    merchant_id: Uuid,
    payment_id: &str,
) -> Result<Payment, AppError> {
    store
        .get_payment(payment_id)
        .await?
        .filter(|payment| payment.merchant_id == merchant_id)
        .ok_or(AppError::NotFound("Payment"))
}

/// Mark a successful payment as captured.
///
/// # Errors
///
/// - `NotFound`: unknown payment or owned by another merchant
/// - `BadRequest`: payment is not in `success` status
pub async fn capture_payment(
    store: &dyn Store,
    merchant_id: Uuid,
    payment_id: &str,
) -> Result<Payment, AppError> {
    let payment = get_payment(store, merchant_id, payment_id).await?;
    if !payment.is_successful() {
        return Err(not_capturable());
    }

    let captured = store
        .capture_payment(&payment.id, merchant_id)
        .await?
        .ok_or_else(not_capturable)?;

    tracing::info!(payment_id = %captured.id, "payment captured");
    Ok(captured)
}

fn not_capturable() -> AppError {
    AppError::BadRequest("Payment not in capturable state".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::merchant::TEST_MERCHANT_ID;
    use crate::models::payment::PaymentOutcome;
    use crate::queue::{InMemoryJobQueue, QueueName};
    use crate::store::{InMemoryStore, PaymentStore};

    fn request(amount: Option<i64>, method: Option<&str>) -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount,
            method: method.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creation_persists_pending_payment_and_enqueues_settlement() {
        let store = InMemoryStore::with_test_merchant().await;
        let queue = InMemoryJobQueue::new();

        let payment = create_payment(&store, &queue, TEST_MERCHANT_ID, request(Some(50000), Some("upi")))
            .await
            .unwrap();

        assert!(payment.id.starts_with("pay_"));
        assert_eq!(payment.status, "pending");
        assert_eq!(payment.currency, "INR");

        let jobs = queue.jobs(QueueName::Payment).await;
        assert_eq!(jobs.len(), 1);
        let job: PaymentJob = jobs[0].decode().unwrap();
        assert_eq!(job.payment_id, payment.id);
    }

    #[tokio::test]
    async fn invalid_requests_create_nothing() {
        let store = InMemoryStore::with_test_merchant().await;
        let queue = InMemoryJobQueue::new();

        for bad in [
            request(None, Some("upi")),
            request(Some(0), Some("upi")),
            request(Some(-5), Some("card")),
            request(Some(100), None),
            request(Some(100), Some("cash")),
        ] {
            let err = create_payment(&store, &queue, TEST_MERCHANT_ID, bad)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        assert!(store.payments().await.is_empty());
        assert!(queue.jobs(QueueName::Payment).await.is_empty());
    }

    #[tokio::test]
    async fn only_successful_payments_are_captured() {
        let store = InMemoryStore::with_test_merchant().await;
        let queue = InMemoryJobQueue::new();
        let payment = create_payment(&store, &queue, TEST_MERCHANT_ID, request(Some(100), Some("card")))
            .await
            .unwrap();

        let err = capture_payment(&store, TEST_MERCHANT_ID, &payment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        store
            .settle_payment(&payment.id, &PaymentOutcome::Success)
            .await
            .unwrap();
        let captured = capture_payment(&store, TEST_MERCHANT_ID, &payment.id)
            .await
            .unwrap();
        assert!(captured.captured);

        let err = capture_payment(&store, Uuid::new_v4(), &payment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("Payment")));
    }
}
