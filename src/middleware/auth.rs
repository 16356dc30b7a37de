//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the `X-Api-Key` header
//! 2. Hash it and look up the owning merchant
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::models::merchant::hash_api_key;

/// Header carrying the merchant's API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Authentication context attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Merchant owning the API key
    ///
    /// Every query issued on behalf of the request is scoped to it.
    pub merchant_id: Uuid,

    pub merchant_name: String,
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `X-Api-Key: <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up the merchant with that hash
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::InvalidApiKey)?;

    let merchant = state
        .store
        .find_merchant_by_api_key_hash(&hash_api_key(api_key))
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    // Route handlers can now extract this using Extension<AuthContext>
    request.extensions_mut().insert(AuthContext {
        merchant_id: merchant.id,
        merchant_name: merchant.name,
    });

    Ok(next.run(request).await)
}
