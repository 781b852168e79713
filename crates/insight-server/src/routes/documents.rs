//! Document routes: upload, list, delete.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use insight_store::DocumentSummary;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "document";

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/documents/upload",
            post(upload_document)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/documents", get(list_documents))
        .route("/documents/delete", get(delete_document))
}

/// POST /api/documents/upload: store, extract and chunk one file.
async fn upload_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, &'static str), ApiError> {
    let max = state.config.max_upload_bytes;

    let (file_name, bytes) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(multipart_error)?
            .ok_or_else(|| ApiError::BadRequest("Invalid file key 'document'.".into()))?;
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        break (file_name, bytes);
    };

    if bytes.len() > max {
        return Err(too_large());
    }
    debug!("Received upload {} ({} bytes) from {}", file_name, bytes.len(), user.user_id);

    let profile = state.identity.user_profile(&user.user_id).await.map_err(|e| {
        error!("Failed to load profile for {}: {}", user.user_id, e);
        ApiError::Upstream("Could not verify user.".into())
    })?;

    // Runs on its own task so a dropped connection does not cancel it midway.
    let task_state = state.clone();
    let doc_id = tokio::spawn(async move {
        task_state
            .ingester
            .ingest(&user.user_id, &profile, bytes.to_vec(), &file_name)
            .await
    })
    .await
    .map_err(|e| {
        error!("Ingestion task failed: {}", e);
        ApiError::Persistence("Failed to save document content.".into())
    })??;

    info!("Upload complete: document {}", doc_id);
    Ok((StatusCode::CREATED, "File uploaded and processed successfully!"))
}

fn too_large() -> ApiError {
    ApiError::BadRequest("File is too large.".into())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        debug!("Malformed multipart body: {}", err.body_text());
        ApiError::BadRequest("Invalid multipart body.".into())
    }
}

/// GET /api/documents: the caller's documents, newest first.
async fn list_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    Ok(Json(state.documents.list(&user.user_id)?))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    id: Option<String>,
}

/// GET /api/documents/delete?id=<docID>
async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<DeleteParams>,
) -> Result<&'static str, ApiError> {
    let document_id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Document ID is required.".into()))?;

    state
        .documents
        .delete(&user.user_id, &document_id)
        .await
        .map_err(|e| match e {
            insight_ingest::LifecycleError::NotFoundOrForbidden => ApiError::NotFoundOrForbidden(
                "Document not found or you do not have permission to delete it.".into(),
            ),
            other => other.into(),
        })?;

    Ok("Document deleted successfully.")
}
