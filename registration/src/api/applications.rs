//! Self-service registration endpoints:
//! - POST /api/applications - Submit a registration
//! - POST /api/applications/lookup - Find a registration by name and student id
//! - PUT /api/applications/:list/:id - Edit a registration (password required)
//! - POST /api/applications/:list/:id/cancel - Cancel a registration (password required)

use crate::server::state::AppState;
use crate::types::{Amendment, ListKind, RecordRef, RegistrantView, RegistrationForm};
use crate::workflows::Submission;
use crate::workflows::cancellation::{Authorization, Promotion};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use roster_web::{AppError, CorrelationId};
use serde::{Deserialize, Serialize};

/// Message for an accepted registration.
pub const ACCEPTED_MESSAGE: &str = "신청이 완료되었습니다. 감사합니다!";

/// Message for a successful edit.
pub const AMENDED_MESSAGE: &str = "정보가 성공적으로 수정되었습니다.";

/// Message for a successful cancellation.
pub const CANCELLED_MESSAGE: &str = "신청/대기 내역이 성공적으로 취소되었습니다.";

/// Message for a waitlisted registration.
#[must_use]
pub fn waitlisted_message(position: usize) -> String {
    format!("정원이 초과되어 대기자로 등록되었습니다. 대기 번호: {position}")
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response after submitting.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Where the record landed
    #[serde(flatten)]
    pub submission: Submission,
    /// Message for the registrant
    pub message: String,
}

/// Lookup keys.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    /// Exact name
    #[serde(default)]
    pub name: String,
    /// Exact student id
    #[serde(default)]
    pub student_id: String,
}

/// Edit request: the current password plus the new values.
#[derive(Debug, Deserialize)]
pub struct AmendRequest {
    /// Current password
    #[serde(default)]
    pub password: String,
    /// New values
    #[serde(flatten)]
    pub changes: Amendment,
}

/// Cancellation request.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Current password
    #[serde(default)]
    pub password: String,
}

/// Confirmation message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message for the registrant
    pub message: String,
}

/// Response after cancelling.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Message for the caller
    pub message: String,
    /// Waitlist entry moved into the freed slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<Promotion>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a registration.
///
/// Returns 201 with `status` `accepted` or `waitlisted`.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/applications \
///   -H "Content-Type: application/json" \
///   -d '{"name":"김이화","studentId":"20250001","phone":"010-1234-5678",
///        "schoolType":"졸업생","password":"1234","eventId":"1"}'
/// ```
///
/// # Errors
///
/// 409 when closed or already registered, 422 for blank fields.
pub async fn submit(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Json(form): Json<RegistrationForm>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    tracing::debug!(correlation_id = %correlation_id.0, "Submission received");

    let submission = state.workflows.submit(form).await?;
    let message = match &submission {
        Submission::Accepted { .. } => ACCEPTED_MESSAGE.to_string(),
        Submission::Waitlisted { position, .. } => waitlisted_message(*position),
    };
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission,
            message,
        }),
    ))
}

/// Find a registration by exact name and student id.
///
/// # Errors
///
/// 422 for blank keys, 404 when nothing matches.
pub async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<RegistrantView>, AppError> {
    let view = state
        .queries
        .lookup(&request.name, &request.student_id)
        .await?;
    Ok(Json(view))
}

/// Edit a registration.
///
/// # Errors
///
/// 422 for blank fields, 401 for a wrong password, 404 for a missing record.
pub async fn amend(
    State(state): State<AppState>,
    Path((list, id)): Path<(ListKind, String)>,
    Json(request): Json<AmendRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .workflows
        .amend(RecordRef::new(list, id), request.password, request.changes)
        .await?;
    Ok(Json(MessageResponse {
        message: AMENDED_MESSAGE.to_string(),
    }))
}

/// Cancel a registration; a freed slot goes to the head of the waitlist.
///
/// # Errors
///
/// 422 for a blank password, 401 for a wrong password, 404 for a missing
/// record, 500 if the record was deleted but promotion failed.
pub async fn cancel(
    State(state): State<AppState>,
    Path((list, id)): Path<(ListKind, String)>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let promoted = state
        .workflows
        .cancel(
            RecordRef::new(list, id),
            Authorization::Secret(request.password),
        )
        .await?;
    Ok(Json(CancelResponse {
        message: CANCELLED_MESSAGE.to_string(),
        promoted,
    }))
}
