use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    InsufficientTokens {
        message: String,
        required: i64,
        available: i64,
    },

    #[error("{0}")]
    Upstream(String),

    #[error("{message}")]
    Provider {
        message: String,
        status: u16,
        body: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Balance too low for a paid action. `action` completes "You need at least N tokens to ...".
    pub fn insufficient(required: i64, available: i64, action: Option<&str>) -> Self {
        let message = match action {
            Some(action) => format!(
                "Insufficient tokens. You need at least {required} tokens to {action}."
            ),
            None => "Insufficient tokens".to_string(),
        };
        AppError::InsufficientTokens {
            message,
            required,
            available,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InsufficientTokens { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) | AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::InsufficientTokens {
                message,
                required,
                available,
            } => json!({
                "error": message,
                "tokensRequired": required,
                "tokensAvailable": available,
            }),
            AppError::Provider {
                message,
                status,
                body,
            } => json!({ "error": message, "status": status, "body": body }),
            AppError::Database(e) => {
                error!("database failure: {e}");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
