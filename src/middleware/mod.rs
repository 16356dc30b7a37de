//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Replay cached responses
//! - Short-circuit requests (reject unauthorized)

/// API key authentication middleware
pub mod auth;
/// Idempotency-Key replay for payment creation
pub mod idempotency;
