use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::storage::StorageError;

/// AppError
///
/// The single error type returned by API handlers. Rendered as a JSON body
/// `{"error": "..."}`. Backend failures are logged here and reach the client only
/// as a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No session on a privileged API call.
    #[error("authentication required")]
    Unauthorized,
    /// A session whose role is not "admin". Also covers role lookups that failed.
    #[error("admin privileges required")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid payload")]
    Validation(#[from] validator::ValidationErrors),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("storage error")]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => json!({
                "error": self.to_string(),
                "details": errors,
            }),
            AppError::Database(e) => {
                tracing::error!(error = ?e, "database failure");
                json!({ "error": "internal server error" })
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                json!({ "error": "internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
