//! Chat routes: questions about a document and its stored history.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use insight_chat::{ChatRequest, ChatResponse};
use insight_store::{ChatTurn, MessageRole};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/history", get(chat_history))
}

/// POST /api/chat: answer a question about one of the caller's documents.
///
/// The exchange is queued for the history log once the answer is ready; a
/// logging failure never affects the response.
async fn chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let req: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejected chat body: {}", e);
        ApiError::BadRequest("Invalid request body".into())
    })?;
    if req.document_id.is_empty() {
        return Err(ApiError::BadRequest("Document ID is required.".into()));
    }

    if !state.store.is_document_owner(&req.document_id, &user.user_id)? {
        return Err(not_found());
    }

    let answer = state.answerer.answer(&req.document_id, &req.query).await?;
    let response = Json(ChatResponse {
        response: answer.clone(),
    });

    state
        .chat_logger
        .log_turn(&req.document_id, &user.user_id, &req.query, &answer);
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    document_id: Option<String>,
}

/// One turn as returned to the client.
#[derive(Debug, Serialize)]
struct HistoryEntry {
    id: String,
    #[serde(rename = "type")]
    role: MessageRole,
    content: String,
    timestamp: String,
}

impl From<ChatTurn> for HistoryEntry {
    fn from(turn: ChatTurn) -> Self {
        Self {
            id: turn.id,
            role: turn.role,
            content: turn.content,
            timestamp: turn.timestamp,
        }
    }
}

/// GET /api/chat/history?documentId=<id>: oldest turn first.
async fn chat_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let document_id = params
        .document_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Document ID is required.".into()))?;

    let turns = state.documents.history(&user.user_id, &document_id)?;
    Ok(Json(turns.into_iter().map(HistoryEntry::from).collect()))
}

fn not_found() -> ApiError {
    ApiError::NotFoundOrForbidden(
        "Document not found or you do not have permission to access it.".into(),
    )
}
