//! Readiness endpoint for the registration service.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use roster_runtime::HealthReport;
use roster_web::handlers::{check_documents, readiness};

/// Readiness check endpoint.
///
/// Combines the health of every workflow store with a round trip to the
/// document store. Returns 503 when any of them is unhealthy.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/ready
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let mut checks = state.workflows.health();
    checks.push(check_documents(state.documents.as_ref(), state.readiness_timeout).await);
    readiness(checks)
}
