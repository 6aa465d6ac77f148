//! Error types for web handlers.
//!
//! This module defines error types that bridge between domain errors
//! and HTTP responses, implementing Axum's `IntoResponse` trait.
//!
//! | failure | status |
//! |---|---|
//! | validation | 422 |
//! | wrong password, missing session | 401 |
//! | not an admin | 403 |
//! | closed, duplicate | 409 |
//! | workflow timeout | 408 |
//! | backend | 500 / 503 |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roster_core::document::DocumentError;
use roster_runtime::StoreError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// This type wraps domain errors and provides HTTP-friendly error responses.
/// It implements Axum's `IntoResponse` trait to automatically convert errors
/// into HTTP responses.
///
/// # Examples
///
/// ```ignore
/// async fn event_detail(Path(id): Path<String>) -> Result<Json<EventInfo>, AppError> {
///     let event = find_event(&id).await?
///         .ok_or_else(|| AppError::not_found("Event", &id))?;
///     Ok(Json(event))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the backend failure that is logged but never shown.
    #[must_use]
    fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the machine-readable error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            message.into(),
            "UNAUTHORIZED".to_string(),
        )
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            message.into(),
            "FORBIDDEN".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            message.into(),
            "CONFLICT".to_string(),
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// Create a 408 Request Timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::REQUEST_TIMEOUT,
            message.into(),
            "TIMEOUT".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Map runtime failures: a timeout means the workflow is still running.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => {
                Self::timeout("요청 처리 시간이 초과되었습니다. 잠시 후 다시 확인해주세요.")
            },
            StoreError::ShutdownInProgress => {
                Self::unavailable("Service is shutting down").with_source(err.into())
            },
            StoreError::NoOutcome | StoreError::ShutdownTimeout(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            },
        }
    }
}

/// Map document store failures.
impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound { collection, id } => Self::not_found(collection, id),
            other @ (DocumentError::Storage(_) | DocumentError::Subscription(_)) => {
                Self::unavailable("Document store unavailable").with_source(other.into())
            },
            other @ DocumentError::Serialization(_) => {
                Self::internal("An internal error occurred").with_source(other.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::conflict("이미 신청하셨습니다.");
        assert_eq!(err.to_string(), "[CONFLICT] 이미 신청하셨습니다.");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Event", "1");
        assert_eq!(err.to_string(), "[NOT_FOUND] Event with id 1 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation() {
        let err = AppError::validation("모든 정보를 입력해주세요.");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_timeout() {
        let err = AppError::timeout("Request timed out");
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.code, "TIMEOUT");
    }

    #[test]
    fn test_with_code_overrides_code() {
        let err = AppError::conflict("현재 신청이 마감되었습니다.").with_code("REGISTRATION_CLOSED");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "REGISTRATION_CLOSED");
    }

    #[test]
    fn test_store_timeout_maps_to_408() {
        let err = AppError::from(StoreError::Timeout);
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_store_shutdown_maps_to_503() {
        let err = AppError::from(StoreError::ShutdownInProgress);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_missing_outcome_is_internal() {
        let err = AppError::from(StoreError::NoOutcome);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_document_errors() {
        let missing = AppError::from(DocumentError::NotFound {
            collection: "applications".to_string(),
            id: "abc".to_string(),
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let down = AppError::from(DocumentError::Storage("connection refused".to_string()));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        // Backend detail stays out of the user-facing message
        assert!(!down.message().contains("refused"));
        let source = std::error::Error::source(&down).map(ToString::to_string);
        assert!(source.is_some_and(|s| s.contains("refused")));
    }
}
