//! Admin endpoints. Everything except login requires a bearer session.
//!
//! - POST /api/admin/login - Sign in, returns a bearer token
//! - POST /api/admin/logout - End the session
//! - GET /api/admin/dashboard - Counts against the current settings
//! - GET /api/admin/roster - Filtered listing of both lists
//! - POST /api/admin/settings/toggle - Open or close registration
//! - PUT /api/admin/settings/capacity - Set the capacity
//! - DELETE /api/admin/:list/:id - Cancel a record, promoting the waitlist head
//! - GET /api/admin/export/:list - CSV download of the filtered list
//! - GET /api/admin/live - WebSocket feed of roster snapshots

use crate::auth::{AdminLogin, AdminSession};
use crate::queries::{Dashboard, RosterFilter, RosterListing, RosterParams};
use crate::server::state::AppState;
use crate::types::{ListKind, RecordRef, Settings};
use crate::workflows::cancellation::{Authorization, Promotion};
use axum::{
    Json,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use roster_web::{AppError, BearerToken, handlers::stream_snapshots};
use serde::{Deserialize, Serialize};

/// Message for a successful capacity change.
pub const CAPACITY_UPDATED_MESSAGE: &str = "최대 인원 수가 성공적으로 업데이트되었습니다.";

/// Message for a toggle, by the new state.
#[must_use]
pub const fn toggled_message(is_closed: bool) -> &'static str {
    if is_closed {
        "신청 상태가 마감되었습니다."
    } else {
        "신청 상태가 오픈되었습니다."
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Sign-in credentials.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Account email
    #[serde(default)]
    pub email: String,
    /// Account password
    #[serde(default)]
    pub password: String,
}

/// New capacity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRequest {
    /// Must be a positive integer
    pub max_capacity: i64,
}

/// Settings after a change.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Confirmation for the admin
    pub message: String,
    /// The stored settings
    pub settings: Settings,
}

/// Outcome of an admin cancellation.
#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    /// Confirmation for the admin
    pub message: String,
    /// Waitlist entry moved into the freed slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<Promotion>,
}

/// Token for the live feed, for clients that cannot set headers.
#[derive(Debug, Default, Deserialize)]
pub struct LiveParams {
    /// Bearer token
    pub token: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Sign in an admin.
///
/// # Errors
///
/// 401 for bad credentials, 403 for a non-admin account.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AdminLogin>, AppError> {
    let login = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(login))
}

/// End the caller's session.
///
/// # Errors
///
/// 401 without a live session.
pub async fn logout(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<StatusCode, AppError> {
    state.auth.logout(&admin.token)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Counts against the current settings.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<Dashboard>, AppError> {
    let settings = state.workflows.settings().await?;
    Ok(Json(state.queries.dashboard(settings).await?))
}

/// Both lists, filtered by `school`, `dorm` and `name`.
///
/// # Errors
///
/// 422 for an unknown filter label.
pub async fn roster(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(params): Query<RosterParams>,
) -> Result<Json<RosterListing>, AppError> {
    let filter = RosterFilter::try_from(params)?;
    Ok(Json(state.queries.roster(&filter).await?))
}

/// Open or close registration.
///
/// # Errors
///
/// 503 when the store is unavailable, 408 on workflow timeout.
pub async fn toggle(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<Json<SettingsResponse>, AppError> {
    let settings = state.workflows.toggle_closed().await?;
    tracing::info!(uid = %admin.session.uid, is_closed = settings.is_closed, "Registration toggled");
    Ok(Json(SettingsResponse {
        message: toggled_message(settings.is_closed).to_string(),
        settings,
    }))
}

/// Set the capacity.
///
/// # Errors
///
/// 422 unless the capacity is a positive integer.
pub async fn set_capacity(
    State(state): State<AppState>,
    admin: AdminSession,
    Json(request): Json<CapacityRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    let settings = state.workflows.set_capacity(request.max_capacity).await?;
    tracing::info!(uid = %admin.session.uid, max_capacity = settings.max_capacity, "Capacity updated");
    Ok(Json(SettingsResponse {
        message: CAPACITY_UPDATED_MESSAGE.to_string(),
        settings,
    }))
}

/// Cancel any record without a password.
///
/// # Errors
///
/// 404 for a missing record, 500 if promotion failed after the delete.
pub async fn remove(
    State(state): State<AppState>,
    admin: AdminSession,
    Path((list, id)): Path<(ListKind, String)>,
) -> Result<Json<RemovalResponse>, AppError> {
    let target = RecordRef::new(list, id);
    tracing::info!(uid = %admin.session.uid, record = %target, "Admin cancellation");
    let promoted = state.workflows.cancel(target, Authorization::Admin).await?;
    Ok(Json(RemovalResponse {
        message: super::applications::CANCELLED_MESSAGE.to_string(),
        promoted,
    }))
}

/// CSV download of one list, with the roster filters applied.
///
/// # Errors
///
/// 422 for an unknown filter label, 500 if rendering fails.
pub async fn export(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(list): Path<ListKind>,
    Query(params): Query<RosterParams>,
) -> Result<Response, AppError> {
    let filter = RosterFilter::try_from(params)?;
    let listing = state.queries.roster(&filter).await?;
    let file = state
        .exporter
        .export(list, listing.list(list), state.clock.now())?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&file.filename)),
        ],
        file.bytes,
    )
        .into_response())
}

/// Upgrade to the live roster feed.
///
/// The token comes from the `Authorization` header or, for browsers, the
/// `token` query parameter.
///
/// # Errors
///
/// 401 without a live admin session, 503 if the subscriptions cannot start.
pub async fn live(
    State(state): State<AppState>,
    bearer: Option<BearerToken>,
    Query(params): Query<LiveParams>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = bearer
        .map(|BearerToken(token)| token)
        .or(params.token)
        .ok_or_else(|| AppError::unauthorized("Missing session token"))?;
    let session = state.auth.authorize(&token).await?;
    let snapshots = state.feed.subscribe().await?;

    tracing::debug!(uid = %session.uid, "Live feed requested");
    Ok(upgrade.on_upgrade(move |socket| stream_snapshots(socket, snapshots)))
}

/// `Content-Disposition` for a download named `filename`, RFC 5987 encoded.
fn attachment_disposition(filename: &str) -> String {
    format!("attachment; filename*=UTF-8''{}", urlencoding::encode(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_encodes_korean_filename() {
        assert_eq!(
            attachment_disposition("신청자_목록_2025-03-14_0930.csv"),
            "attachment; filename*=UTF-8''%EC%8B%A0%EC%B2%AD%EC%9E%90_%EB%AA%A9%EB%A1%9D_2025-03-14_0930.csv"
        );
        assert_eq!(
            attachment_disposition("a b;c\"d.csv"),
            "attachment; filename*=UTF-8''a%20b%3Bc%22d.csv"
        );
    }
}
