//! Public read endpoints:
//! - GET /api/events - Event catalogue
//! - GET /api/events/:id - Event details
//! - GET /api/notices - Notices, newest first
//! - GET /api/settings - Whether registration is open, and the capacity

use crate::server::state::AppState;
use crate::types::{EventInfo, Notice};
use axum::{
    Json,
    extract::{Path, State},
};
use roster_web::AppError;
use serde::Serialize;

/// Public view of the settings singleton.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    /// Submissions are accepted
    pub is_open: bool,
    /// Registration capacity
    pub max_capacity: u32,
}

/// List the event catalogue.
#[allow(clippy::unused_async)]
pub async fn list_events(State(state): State<AppState>) -> Json<Vec<EventInfo>> {
    Json(state.queries.events())
}

/// Get event details.
///
/// # Errors
///
/// 404 for an unknown id, 503 when the store is unavailable.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventInfo>, AppError> {
    Ok(Json(state.queries.event(&id).await?))
}

/// List notices, newest first.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn list_notices(State(state): State<AppState>) -> Result<Json<Vec<Notice>>, AppError> {
    Ok(Json(state.queries.notices().await?))
}

/// Whether registration is open.
///
/// # Errors
///
/// 503 when the store is unavailable, 408 on workflow timeout.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<PublicSettings>, AppError> {
    let settings = state.workflows.settings().await?;
    Ok(Json(PublicSettings {
        is_open: !settings.is_closed,
        max_capacity: settings.max_capacity,
    }))
}
