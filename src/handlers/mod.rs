//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Service health endpoint
pub mod health;
/// Job queue status endpoint
pub mod jobs;
/// Payment endpoints
pub mod payments;
/// Refund endpoints
pub mod refunds;
/// Webhook dashboard endpoints
pub mod webhooks;
