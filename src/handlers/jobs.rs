//! Job queue status endpoint.

use axum::{Json, extract::State};

use crate::app::AppState;
use crate::error::AppError;
use crate::services::job_service::{self, JobStatusResponse, WorkerStatus};

/// Aggregated queue counts.
///
/// # Response
///
/// ```json
/// {
///   "pending": 2,
///   "delayed": 1,
///   "processing": 1,
///   "completed": 40,
///   "failed": 0,
///   "worker_status": "running",
///   "queues": { "payment": { "waiting": 1, ... }, ... }
/// }
/// ```
///
/// Unauthenticated.
pub async fn job_status(State(state): State<AppState>) -> Result<Json<JobStatusResponse>, AppError> {
    let worker_status = if state.workers_embedded {
        WorkerStatus::Running
    } else {
        WorkerStatus::External
    };

    let status = job_service::job_status(state.queue.as_ref(), worker_status).await?;
    Ok(Json(status))
}
