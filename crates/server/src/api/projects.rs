//! Project index handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lexiclass_core::index::{IndexEntry, IndexStatus, IndexSummary, ProjectIndexStatus};
use lexiclass_core::{JobKind, JobTarget, JobView};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProjectIndexResponse {
    pub project_id: i64,
    pub status: ProjectIndexStatus,
    #[serde(flatten)]
    pub summary: IndexSummary,
    /// Most recent index job for the project, if any
    pub last_job: Option<JobView>,
}

#[derive(Debug, Deserialize)]
pub struct EntriesParams {
    pub status: Option<IndexStatus>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub project_id: i64,
    pub entries: Vec<IndexEntry>,
}

/// Index summary and derived status of a project
pub async fn get_index(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> Result<Json<ProjectIndexResponse>, ApiError> {
    let stores = state.stores();
    let summary = stores
        .index
        .summary(project_id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let last_job = stores
        .jobs
        .latest_for_target(JobKind::Index, &JobTarget::project(project_id))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(ProjectIndexResponse {
        project_id,
        status: summary.index_status(),
        summary,
        last_job: last_job.map(JobView::from),
    }))
}

/// Per-document index entries, optionally filtered by status
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Query(params): Query<EntriesParams>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let entries = state
        .stores()
        .index
        .entries(project_id, params.status)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(EntriesResponse {
        project_id,
        entries,
    }))
}
