//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers and
//! queue workers. They validate input, talk to the store and enqueue jobs.

pub mod job_service;
pub mod payment_service;
pub mod reconciliation;
pub mod refund_service;
pub mod retry;
pub mod signature;
pub mod simulator;
pub mod webhook_service;
