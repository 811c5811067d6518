//! Query submission and job status handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use fingraph_models::JobRecord;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Query submission request.
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
}

/// Job submission response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

/// Submit a query for processing.
pub async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<JobResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let job = state.jobs.enqueue(&request.query, None).await?;

    // Publish the queued state immediately so a late SSE subscriber still
    // observes it via history replay.
    state
        .bus
        .status(&job.job_id, "Job queued, waiting for worker...")
        .await?;

    metrics::record_job_enqueued();

    Ok(Json(JobResponse {
        job_id: job.job_id,
        status: "queued".to_string(),
        message: "Query submitted successfully".to_string(),
    }))
}

/// Get the status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    state
        .jobs
        .get(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}
