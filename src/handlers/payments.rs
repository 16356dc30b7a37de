//! Payment HTTP handlers.
//!
//! This module implements payment-related API endpoints:
//! - POST /api/v1/payments - Create a payment (Idempotency-Key aware)
//! - GET /api/v1/payments/{id} - Get payment details
//! - POST /api/v1/payments/{id}/capture - Capture a successful payment

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::payment::{CreatePaymentRequest, PaymentResponse};
use crate::services::payment_service;

/// Create a payment.
///
/// # Request Body
///
/// ```json
/// {
///   "amount": 50000,
///   "currency": "INR",
///   "method": "upi",
///   "order_id": "order_001",
///   "vpa": "user@paytm"
/// }
/// ```
///
/// # Response (201)
///
/// The payment with status `pending`. Settlement happens asynchronously;
/// poll `GET /api/v1/payments/{id}` or wait for the webhook.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let payment = payment_service::create_payment(
        state.store.as_ref(),
        state.queue.as_ref(),
        auth.merchant_id,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

/// Get payment details.
///
/// Returns 404 for payments of other merchants.
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment =
        payment_service::get_payment(state.store.as_ref(), auth.merchant_id, &payment_id).await?;

    Ok(Json(payment.into()))
}

/// Capture a successful payment.
///
/// # Errors
///
/// - 404 `NOT_FOUND_ERROR`: unknown payment
/// - 400 `BAD_REQUEST_ERROR`: payment is not in `success` status
pub async fn capture_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment =
        payment_service::capture_payment(state.store.as_ref(), auth.merchant_id, &payment_id)
            .await?;

    Ok(Json(payment.into()))
}
