//! Router construction and shared handler state.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware;
use crate::queue::JobQueue;
use crate::store::Store;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn JobQueue>,

    /// Whether this process also runs the queue workers
    pub workers_embedded: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, workers_embedded: bool) -> Self {
        Self {
            store,
            queue,
            workers_embedded,
        }
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    // Payment creation replays cached responses for repeated Idempotency-Keys
    let create_payment = post(handlers::payments::create_payment).route_layer(
        axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::idempotency::idempotency_middleware,
        ),
    );

    let authenticated_routes = Router::new()
        .route("/api/v1/payments", create_payment)
        .route(
            "/api/v1/payments/{id}",
            get(handlers::payments::get_payment),
        )
        .route(
            "/api/v1/payments/{id}/capture",
            post(handlers::payments::capture_payment),
        )
        .route(
            "/api/v1/payments/{id}/refunds",
            post(handlers::refunds::create_refund),
        )
        .route("/api/v1/refunds/{id}", get(handlers::refunds::get_refund))
        .route(
            "/api/v1/webhooks",
            get(handlers::webhooks::list_webhook_logs),
        )
        .route(
            "/api/v1/webhooks/settings",
            put(handlers::webhooks::update_webhook_settings),
        )
        .route(
            "/api/v1/webhooks/{id}/retry",
            post(handlers::webhooks::retry_webhook),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/test/jobs/status",
            get(handlers::jobs::job_status),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
