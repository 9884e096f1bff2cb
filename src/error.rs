//! Error types shared by the services and the HTTP layer.
//!
//! `StoreError` is what the persistence ports return. `AppError` is what every
//! service operation returns and what handlers turn into
//! `{ "success": false, "error": ..., "code": ... }` responses.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures reported by a persistence port.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A concurrent writer won the race; the caller may retry the whole
    /// read-modify-write.
    #[error("write conflict")]
    Conflict,

    #[error("record already exists")]
    AlreadyExists,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    PayloadTooLarge,
    PrecursorMissing,
    NotInRevisionState,
    InvalidTransition,
    Unauthorized,
    Forbidden,
    NotFound,
    NotAvailable,
    Conflict,
    StoreTransient,
    UpstreamGatewayError,
    InternalError,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("file of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{message}")]
    PrecursorMissing { message: String },

    #[error("submission is {status}, resubmission requires accepted_with_revision")]
    NotInRevisionState { status: String },

    #[error("cannot move submission from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("no successful payment found for {key}")]
    NotAvailable { key: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("storage temporarily unavailable: {0}")]
    StoreTransient(String),

    #[error("payment gateway error: {message}")]
    UpstreamGateway { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::PrecursorMissing { .. } => ErrorCode::PrecursorMissing,
            AppError::NotInRevisionState { .. } => ErrorCode::NotInRevisionState,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::NotAvailable { .. } => ErrorCode::NotAvailable,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::StoreTransient(_) => ErrorCode::StoreTransient,
            AppError::UpstreamGateway { .. } => ErrorCode::UpstreamGatewayError,
            AppError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::PrecursorMissing { .. }
            | AppError::NotInRevisionState { .. }
            | AppError::InvalidTransition { .. }
            | AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } | AppError::NotAvailable { .. } => StatusCode::NOT_FOUND,
            AppError::StoreTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamGateway { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller can reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreTransient(_))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => {
                AppError::StoreTransient("concurrent update, please retry".to_string())
            }
            StoreError::AlreadyExists => AppError::Conflict {
                message: "record already exists".to_string(),
            },
            StoreError::Unavailable(message) => AppError::StoreTransient(message),
            StoreError::Corrupt(message) => AppError::Internal { message },
            StoreError::Database(e) => AppError::StoreTransient(e.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::validation(format!("malformed multipart body: {}", err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: ErrorCode,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, code = ?code, status = status.as_u16(), "Server error");
        } else {
            tracing::warn!(error = %message, code = ?code, status = status.as_u16(), "Client error");
        }

        let body = ErrorBody {
            success: false,
            error: message,
            code,
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
