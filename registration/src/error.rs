//! Domain errors and their HTTP mapping.

use crate::types::RecordRef;
use crate::validation::ValidationError;
use axum::http::StatusCode;
use roster_core::document::DocumentError;
use roster_runtime::StoreError;
use roster_web::AppError;
use thiserror::Error;

/// Message for a submission while registration is closed.
pub const CLOSED_MESSAGE: &str = "현재 신청이 마감되었습니다. 관리자에게 문의해주세요.";

/// Message for a student id already in the registration list.
pub const ALREADY_REGISTERED_MESSAGE: &str = "이미 신청하셨습니다.";

/// Message for a student id already on the waitlist.
pub const ALREADY_WAITLISTED_MESSAGE: &str = "이미 대기자로 등록되어 있습니다.";

/// Message for a failed secret comparison.
pub const WRONG_PASSWORD_MESSAGE: &str = "비밀번호가 올바르지 않습니다.";

/// Message for a lookup or reference that matches nothing.
pub const RECORD_NOT_FOUND_MESSAGE: &str =
    "신청 내역을 찾을 수 없습니다. 이름과 학번을 다시 확인해주세요.";

/// Message for a capacity that is not a positive integer.
pub const INVALID_CAPACITY_MESSAGE: &str = "최대 인원 수는 1 이상의 정수여야 합니다.";

/// Message for an unknown event id.
pub const EVENT_NOT_FOUND_MESSAGE: &str = "해당 이벤트를 찾을 수 없습니다.";

/// Errors reported by roster operations.
#[derive(Error, Debug)]
pub enum RosterError {
    /// A required field is blank or malformed
    #[error("{0}")]
    Invalid(String),

    /// Registration is closed
    #[error("현재 신청이 마감되었습니다. 관리자에게 문의해주세요.")]
    RegistrationClosed,

    /// The student id is already registered
    #[error("이미 신청하셨습니다.")]
    AlreadyRegistered,

    /// The student id is already on the waitlist
    #[error("이미 대기자로 등록되어 있습니다.")]
    AlreadyWaitlisted,

    /// The supplied password does not match the record
    #[error("비밀번호가 올바르지 않습니다.")]
    WrongPassword,

    /// Capacity must be a positive integer
    #[error("최대 인원 수는 1 이상의 정수여야 합니다.")]
    InvalidCapacity,

    /// No record at the given reference
    #[error("신청 내역을 찾을 수 없습니다. 이름과 학번을 다시 확인해주세요.")]
    RecordNotFound(Option<RecordRef>),

    /// No event with the given id
    #[error("해당 이벤트를 찾을 수 없습니다.")]
    EventNotFound(String),

    /// The record was deleted but moving the waitlist head failed
    #[error("취소는 완료되었지만 대기자를 신청 목록으로 이동하지 못했습니다: {0}")]
    PromotionFailed(DocumentError),

    /// The document store failed
    #[error(transparent)]
    Storage(#[from] DocumentError),

    /// The workflow store failed or timed out
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationError> for RosterError {
    fn from(error: ValidationError) -> Self {
        Self::Invalid(error.0.to_string())
    }
}

impl From<RosterError> for AppError {
    fn from(error: RosterError) -> Self {
        let message = error.to_string();
        match error {
            RosterError::Invalid(_) => AppError::validation(message),
            RosterError::InvalidCapacity => {
                AppError::validation(message).with_code("INVALID_CAPACITY")
            },
            RosterError::RegistrationClosed => {
                AppError::conflict(message).with_code("REGISTRATION_CLOSED")
            },
            RosterError::AlreadyRegistered => {
                AppError::conflict(message).with_code("ALREADY_REGISTERED")
            },
            RosterError::AlreadyWaitlisted => {
                AppError::conflict(message).with_code("ALREADY_WAITLISTED")
            },
            RosterError::WrongPassword => {
                AppError::unauthorized(message).with_code("WRONG_PASSWORD")
            },
            RosterError::RecordNotFound(reference) => {
                tracing::debug!(record = ?reference, "Record not found");
                AppError::new(StatusCode::NOT_FOUND, message, "RECORD_NOT_FOUND".to_string())
            },
            RosterError::EventNotFound(id) => {
                tracing::debug!(event_id = %id, "Event not found");
                AppError::new(StatusCode::NOT_FOUND, message, "EVENT_NOT_FOUND".to_string())
            },
            RosterError::PromotionFailed(source) => {
                tracing::error!(error = %source, "Promotion failed after cancellation");
                AppError::internal(message).with_code("PROMOTION_FAILED")
            },
            RosterError::Storage(source) => AppError::from(source),
            RosterError::Store(source) => AppError::from(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RosterError::Invalid("x".to_string()), StatusCode::UNPROCESSABLE_ENTITY),
            (RosterError::InvalidCapacity, StatusCode::UNPROCESSABLE_ENTITY),
            (RosterError::RegistrationClosed, StatusCode::CONFLICT),
            (RosterError::AlreadyRegistered, StatusCode::CONFLICT),
            (RosterError::AlreadyWaitlisted, StatusCode::CONFLICT),
            (RosterError::WrongPassword, StatusCode::UNAUTHORIZED),
            (RosterError::RecordNotFound(None), StatusCode::NOT_FOUND),
            (
                RosterError::Store(StoreError::Timeout),
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                RosterError::Storage(DocumentError::Storage("down".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(AppError::from(error).status(), expected);
        }
    }

    #[test]
    fn test_messages_are_user_facing() {
        let error = AppError::from(RosterError::AlreadyWaitlisted);
        assert_eq!(error.message(), "이미 대기자로 등록되어 있습니다.");
        assert_eq!(error.code(), "ALREADY_WAITLISTED");

        let error = AppError::from(RosterError::RecordNotFound(None));
        assert_eq!(error.message(), RECORD_NOT_FOUND_MESSAGE);
    }
}
