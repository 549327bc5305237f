use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use trashtocash_domain::{
    BoundsError, FeedbackError, PricingError, TransitionError, UnknownVariant,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Validation error")]
    InvalidFields(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    errors: Some(vec![message.clone()]),
                    message,
                },
            ),
            AppError::InvalidFields(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message: "Validation error".to_string(),
                    errors: Some(errors),
                },
            ),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, plain(message)),
            AppError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, plain(message)),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, plain(message)),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, plain(message)),
            AppError::Conflict(message) => (StatusCode::CONFLICT, plain(message)),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    plain("Internal server error".to_string()),
                )
            }
            AppError::Internal(message) => {
                tracing::error!("Internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    plain("Internal server error".to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn plain(message: String) -> ErrorBody {
    ErrorBody {
        message,
        errors: None,
    }
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<BoundsError> for AppError {
    fn from(e: BoundsError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<UnknownVariant> for AppError {
    fn from(e: UnknownVariant) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Terminal(_) => AppError::Conflict(e.to_string()),
            TransitionError::NotPermitted(_) => AppError::Forbidden(e.to_string()),
        }
    }
}

impl From<FeedbackError> for AppError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::Rating | FeedbackError::CommentTooLong => {
                AppError::Validation(e.to_string())
            }
            FeedbackError::NotCompleted | FeedbackError::AlreadySubmitted => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::BadRequest(format!("Failed to read multipart field: {}", e.body_text()))
    }
}
