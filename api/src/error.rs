use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use searchlens_core::error::codes;

/// Internal error type that converts to structured JSON responses.
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Authorization flow failure (401)
    Unauthorized { message: String },
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, error, message, field, docs_hint) = match self {
            AppError::Validation {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                codes::VALIDATION_FAILED,
                message,
                field,
                docs_hint,
            ),
            AppError::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                codes::AUTH_MISSING,
                message,
                None,
                None,
            ),
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                    None,
                )
            }
        };

        let mut payload = json!({
            "error": error,
            "message": message,
            "request_id": request_id,
        });
        if let Some(field) = field {
            payload["field"] = Value::String(field);
        }
        if let Some(docs_hint) = docs_hint {
            payload["docs_hint"] = Value::String(docs_hint);
        }

        (status, Json(payload)).into_response()
    }
}
