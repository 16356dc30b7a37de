//! Payment gateway back office.
//!
//! An HTTP API that accepts payments and refunds, and three queue workers
//! that settle them asynchronously and deliver signed webhooks to merchants.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries), or in-memory
//! - **Jobs**: durable `jobs` table claimed with `FOR UPDATE SKIP LOCKED`
//! - **Authentication**: API key with SHA-256 hashing
//! - **Webhooks**: HMAC-SHA256 signed, retried up to 5 attempts

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod services;
pub mod store;
pub mod workers;
