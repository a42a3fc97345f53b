//! Field handlers: fields, classes and labels, model versions and latest
//! predictions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use lexiclass_core::corpus::{DocumentLabel, Field, FieldClass};
use lexiclass_core::prediction::Prediction;
use lexiclass_core::{ClassId, CorpusError, DocumentId, ModelVersion, ProjectId};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub field: Field,
    /// Newest first
    pub versions: Vec<ModelVersion>,
    pub latest_ready: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PredictionsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub field_id: i64,
    pub predictions: Vec<Prediction>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateFieldBody {
    pub name: String,
    /// Classes created together with the field
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FieldResponse {
    pub field: Field,
    pub classes: Vec<FieldClass>,
}

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub project_id: ProjectId,
    pub fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
pub struct AddClassBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetLabelBody {
    pub class_id: ClassId,
}

fn corpus_error(e: CorpusError) -> ApiError {
    let status = match &e {
        CorpusError::Validation(_) | CorpusError::ClassNotFound { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CorpusError::FieldNotFound(_) => StatusCode::NOT_FOUND,
        CorpusError::Duplicate(_) => StatusCode::CONFLICT,
        CorpusError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

fn require_field(state: &AppState, field_id: i64) -> Result<Field, ApiError> {
    state
        .stores()
        .corpus
        .get_field(field_id)
        .map_err(corpus_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Field not found: {}", field_id)))
}

/// Create a field, optionally with its classes
pub async fn create_field(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<CreateFieldBody>,
) -> Result<(StatusCode, Json<FieldResponse>), ApiError> {
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = body.classes.iter().find(|name| !seen.insert(name.trim())) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("class '{}' listed twice", dup),
        ));
    }

    let corpus = &state.stores().corpus;
    let field = corpus
        .create_field(project_id, &body.name)
        .map_err(corpus_error)?;
    let classes = body
        .classes
        .iter()
        .map(|name| corpus.add_class(field.field_id, name))
        .collect::<Result<Vec<_>, _>>()
        .map_err(corpus_error)?;

    info!(project_id, field_id = field.field_id, classes = classes.len(), "Field created");
    Ok((StatusCode::CREATED, Json(FieldResponse { field, classes })))
}

/// Fields of a project
pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<FieldsResponse>, ApiError> {
    let fields = state
        .stores()
        .corpus
        .list_fields(project_id)
        .map_err(corpus_error)?;
    Ok(Json(FieldsResponse { project_id, fields }))
}

/// A field with its classes
pub async fn get_field(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<i64>,
) -> Result<Json<FieldResponse>, ApiError> {
    let field = require_field(&state, field_id)?;
    let classes = state
        .stores()
        .corpus
        .classes_for_field(field_id)
        .map_err(corpus_error)?;
    Ok(Json(FieldResponse { field, classes }))
}

/// Add a class to a field
pub async fn add_class(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<i64>,
    Json(body): Json<AddClassBody>,
) -> Result<(StatusCode, Json<FieldClass>), ApiError> {
    let class = state
        .stores()
        .corpus
        .add_class(field_id, &body.name)
        .map_err(corpus_error)?;
    Ok((StatusCode::CREATED, Json(class)))
}

/// Set or replace the label of a document for a field
pub async fn set_label(
    State(state): State<Arc<AppState>>,
    Path((field_id, document_id)): Path<(i64, DocumentId)>,
    Json(body): Json<SetLabelBody>,
) -> Result<Json<DocumentLabel>, ApiError> {
    state
        .stores()
        .corpus
        .set_label(document_id, field_id, body.class_id)
        .map(Json)
        .map_err(corpus_error)
}

/// Model versions of a field
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<i64>,
) -> Result<Json<VersionsResponse>, ApiError> {
    let field = require_field(&state, field_id)?;
    let versions = state
        .stores()
        .versions
        .list(field_id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let latest_ready = versions
        .iter()
        .find(|v| v.status == lexiclass_core::ModelStatus::Ready)
        .map(|v| v.version);

    Ok(Json(VersionsResponse {
        field,
        versions,
        latest_ready,
    }))
}

/// Latest prediction per document for a field
pub async fn list_predictions(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<i64>,
    Query(params): Query<PredictionsParams>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    require_field(&state, field_id)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let predictions = state
        .stores()
        .latest
        .list_for_field(field_id, limit, offset)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(PredictionsResponse {
        field_id,
        predictions,
        limit,
        offset,
    }))
}
