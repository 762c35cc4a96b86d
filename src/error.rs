//! Structured error types for API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    InvalidJson,
    UnsupportedFileType,
    PayloadTooLarge,
    Unauthorized,

    // Not found errors
    TodoNotFound,
    CategoryNotFound,
    TagNotFound,
    PriorityNotFound,
    AttachmentNotFound,
    RouteNotFound,

    // Conflict errors
    AlreadyExists,

    // Integrity errors
    SubtaskCycle,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status class for this code.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::InvalidJson
            | ErrorCode::UnsupportedFileType => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::TodoNotFound
            | ErrorCode::CategoryNotFound
            | ErrorCode::TagNotFound
            | ErrorCode::PriorityNotFound
            | ErrorCode::AttachmentNotFound
            | ErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::SubtaskCycle => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_internal(self) -> bool {
        matches!(self, ErrorCode::DatabaseError | ErrorCode::InternalError)
    }
}

/// Structured error returned by every API endpoint.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_json(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidJson, reason)
    }

    pub fn todo_not_found(todo_id: &str) -> Self {
        Self::new(
            ErrorCode::TodoNotFound,
            format!("Todo not found: {}", todo_id),
        )
    }

    pub fn category_not_found(category_id: &str) -> Self {
        Self::new(
            ErrorCode::CategoryNotFound,
            format!("Category not found: {}", category_id),
        )
    }

    pub fn tag_not_found(tag_id: &str) -> Self {
        Self::new(ErrorCode::TagNotFound, format!("Tag not found: {}", tag_id))
    }

    pub fn priority_not_found(level: i64) -> Self {
        Self::new(
            ErrorCode::PriorityNotFound,
            format!("Priority level not found: {}", level),
        )
    }

    pub fn attachment_not_found(attachment_id: &str) -> Self {
        Self::new(
            ErrorCode::AttachmentNotFound,
            format!("Attachment not found: {}", attachment_id),
        )
    }

    pub fn route_not_found(path: &str) -> Self {
        Self::new(ErrorCode::RouteNotFound, format!("No route for {}", path))
    }

    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("A {} named '{}' already exists", kind, name),
        )
        .with_field("name")
    }

    pub fn subtask_cycle(todo_id: &str, parent_id: &str) -> Self {
        Self::new(
            ErrorCode::SubtaskCycle,
            format!(
                "Setting {} as parent of {} would create a cycle",
                parent_id, todo_id
            ),
        )
        .with_field("parent_id")
    }

    pub fn payload_too_large(limit_bytes: u64) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!(
                "File size exceeds maximum allowed size of {:.1} MB",
                limit_bytes as f64 / (1024.0 * 1024.0)
            ),
        )
    }

    pub fn unsupported_file_type(extension: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedFileType,
            format!("File type '{}' is not allowed", extension),
        )
        .with_field("file")
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, reason)
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

// Store methods return anyhow; recover domain errors by downcasting.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(sql_err) => ApiError::database(sql_err),
                Err(err) => ApiError::internal(format!("{:#}", err)),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if self.code.is_internal() {
            // Storage internals stay in the log.
            tracing::error!(code = ?self.code, "request failed: {}", self.message);
            let generic = ApiError::new(
                self.code,
                "An unexpected error occurred while processing your request",
            );
            return (status, Json(generic)).into_response();
        }
        (status, Json(self)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
