//! Mapping of component failures onto HTTP responses.
//!
//! Bodies are short plain-text messages; details only go to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use insight_chat::AnswerError;
use insight_ingest::{ExtractError, IngestError, LifecycleError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFoundOrForbidden(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFoundOrForbidden(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self {
            Self::Unauthenticated(m)
            | Self::BadRequest(m)
            | Self::NotFoundOrForbidden(m)
            | Self::Upstream(m)
            | Self::Persistence(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ExtractionFailed(ExtractError::UnsupportedFormat(ext)) => {
                Self::BadRequest(format!("Unsupported file type: .{}", ext))
            }
            IngestError::UserSyncFailed(e) => {
                error!("Failed to upsert user: {}", e);
                Self::Persistence("Failed to save user data.".into())
            }
            IngestError::StorageWriteFailed(e) => {
                error!("Blob upload failed: {}", e);
                Self::Upstream("Failed to upload file to cloud storage.".into())
            }
            IngestError::ExtractionFailed(e) => {
                error!("Text extraction failed: {}", e);
                Self::Upstream("File uploaded, but failed to extract text content.".into())
            }
            IngestError::PersistenceFailed(e) => {
                error!("Document transaction failed: {}", e);
                Self::Persistence("Failed to save document content.".into())
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFoundOrForbidden => Self::NotFoundOrForbidden(
                "Document not found or you do not have permission to access it.".into(),
            ),
            LifecycleError::Persistence(e) => Self::from(e),
        }
    }
}

impl From<AnswerError> for ApiError {
    fn from(err: AnswerError) -> Self {
        error!("Error generating answer: {}", err);
        Self::Upstream("Failed to generate AI insight.".into())
    }
}

impl From<insight_core::Error> for ApiError {
    fn from(err: insight_core::Error) -> Self {
        error!("Database error: {}", err);
        Self::Persistence("Internal server error.".into())
    }
}
