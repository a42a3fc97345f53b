//! Document handlers: upload content and register it for indexing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use lexiclass_core::{DocumentId, ProjectId};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// Maximum documents per upload or delete request
const MAX_BATCH: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct DocumentUpload {
    pub document_id: DocumentId,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentsBody {
    pub documents: Vec<DocumentUpload>,
}

#[derive(Debug, Serialize)]
pub struct UploadDocumentsResponse {
    pub project_id: ProjectId,
    /// Documents whose content was written
    pub stored: usize,
    /// Documents that were not registered before this upload
    pub registered: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentsBody {
    pub document_ids: Vec<DocumentId>,
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentsResponse {
    pub project_id: ProjectId,
    pub removed: usize,
}

fn validate_batch(project_id: ProjectId, ids: &[DocumentId]) -> Result<(), ApiError> {
    if project_id <= 0 {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("project_id must be positive, got {}", project_id),
        ));
    }
    if ids.is_empty() || ids.len() > MAX_BATCH {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("expected 1 to {} documents, got {}", MAX_BATCH, ids.len()),
        ));
    }
    if let Some(bad) = ids.iter().find(|id| **id <= 0) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("document_id must be positive, got {}", bad),
        ));
    }
    Ok(())
}

/// Store document content and register the documents as pending
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<UploadDocumentsBody>,
) -> Result<(StatusCode, Json<UploadDocumentsResponse>), ApiError> {
    let ids: Vec<DocumentId> = body.documents.iter().map(|d| d.document_id).collect();
    validate_batch(project_id, &ids)?;

    let stores = state.stores();
    for document in &body.documents {
        stores
            .artifacts
            .write_document(project_id, document.document_id, &document.text)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    }
    let registered = stores
        .index
        .add_documents(project_id, &ids)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    info!(project_id, stored = ids.len(), registered, "Documents uploaded");
    Ok((
        StatusCode::CREATED,
        Json(UploadDocumentsResponse {
            project_id,
            stored: ids.len(),
            registered,
        }),
    ))
}

/// Forget documents and remove their content
pub async fn delete_documents(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<DeleteDocumentsBody>,
) -> Result<Json<DeleteDocumentsResponse>, ApiError> {
    validate_batch(project_id, &body.document_ids)?;

    let stores = state.stores();
    let removed = stores
        .index
        .remove_documents(project_id, &body.document_ids)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    for document_id in &body.document_ids {
        stores
            .artifacts
            .delete_document(project_id, *document_id)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    }

    info!(project_id, removed, "Documents deleted");
    Ok(Json(DeleteDocumentsResponse {
        project_id,
        removed,
    }))
}
