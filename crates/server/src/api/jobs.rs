//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lexiclass_core::{JobError, JobFilter, JobKind, JobState, JobTarget, JobView};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct SubmitJobBody {
    pub kind: JobKind,
    pub project_id: i64,
    /// Required for train and predict, rejected for index
    pub field_id: Option<i64>,
    /// Kind-specific payload, `{}` when omitted
    pub payload: Option<serde_json::Value>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub state: Option<JobState>,
    pub kind: Option<JobKind>,
    pub project_id: Option<i64>,
    pub field_id: Option<i64>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn job_error(e: JobError) -> ApiError {
    let status = match &e {
        JobError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::AlreadyClaimed(_)
        | JobError::InvalidTransition { .. }
        | JobError::Conflict { .. } => StatusCode::CONFLICT,
        JobError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new job
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitJobBody>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let target = JobTarget {
        project_id: body.project_id,
        field_id: body.field_id,
    };
    let payload = body
        .payload
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    let job = state
        .stores()
        .jobs
        .submit(body.kind, target, payload)
        .map_err(job_error)?;

    Ok((StatusCode::CREATED, Json(JobView::from(job))))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.stores().jobs.status(&id).map(Json).map_err(job_error)
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);
    if let Some(job_state) = params.state {
        filter = filter.with_state(job_state);
    }
    if let Some(kind) = params.kind {
        filter = filter.with_kind(kind);
    }
    if let Some(project_id) = params.project_id {
        filter = filter.with_project(project_id);
    }
    if let Some(field_id) = params.field_id {
        filter = filter.with_field(field_id);
    }

    let jobs = state.stores().jobs.list(&filter).map_err(job_error)?;

    // count ignores limit and offset
    let total = state.stores().jobs.count(&filter).map_err(job_error)?;

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobView::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Cancel a pending or started job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .stores()
        .jobs
        .cancel(&id)
        .map(|job| Json(JobView::from(job)))
        .map_err(job_error)
}
