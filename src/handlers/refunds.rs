//! Refund HTTP handlers.
//!
//! - POST /api/v1/payments/{id}/refunds - Refund (part of) a payment
//! - GET /api/v1/refunds/{id} - Get refund details

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::refund::{CreateRefundRequest, Refund};
use crate::services::refund_service;

/// Create a refund.
///
/// # Request Body
///
/// ```json
/// { "amount": 25000, "reason": "Customer requested" }
/// ```
///
/// # Validation
///
/// - Payment must exist, belong to the merchant and be `success`
/// - Sum of non-failed refunds may not exceed the payment amount
pub async fn create_refund(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<String>,
    payload: Result<Json<CreateRefundRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let refund = refund_service::create_refund(
        state.store.as_ref(),
        state.queue.as_ref(),
        auth.merchant_id,
        &payment_id,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn get_refund(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(refund_id): Path<String>,
) -> Result<Json<Refund>, AppError> {
    let refund =
        refund_service::get_refund(state.store.as_ref(), auth.merchant_id, &refund_id).await?;

    Ok(Json(refund))
}
