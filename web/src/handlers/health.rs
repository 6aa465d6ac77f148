//! Liveness and readiness endpoints.
//!
//! `/health` only proves the process answers. `/ready` aggregates the
//! checks a service collects (workflow stores, the document store) and
//! turns the worst of them into the status code.

use axum::{http::StatusCode, Json};
use roster_core::document::DocumentStore;
use roster_runtime::{HealthCheck, HealthReport, HealthStatus};
use std::time::Duration;

/// `GET /health`: 200 while the process is up. Checks nothing else.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Round-trip the document store within `timeout`.
pub async fn check_documents(documents: &dyn DocumentStore, timeout: Duration) -> HealthCheck {
    match tokio::time::timeout(timeout, documents.ping()).await {
        Ok(Ok(())) => HealthCheck::healthy("documents"),
        Ok(Err(e)) => HealthCheck::unhealthy("documents", e.to_string()),
        Err(_) => HealthCheck::unhealthy("documents", "ping timed out")
            .with_metadata("timeout_ms", timeout.as_millis().to_string()),
    }
}

/// Turn a set of checks into a readiness response.
///
/// Degraded components still answer 200; any unhealthy one answers 503.
///
/// ```json
/// {
///   "status": "healthy",
///   "checks": [{ "component": "documents", "status": "healthy", ... }],
///   "timestamp": "2025-07-19T09:00:00Z"
/// }
/// ```
#[must_use]
pub fn readiness(checks: Vec<HealthCheck>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(checks);
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_testing::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_check_documents_in_memory() {
        let documents = InMemoryDocumentStore::new();
        let check = check_documents(&documents, Duration::from_secs(1)).await;
        assert_eq!(check.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_readiness_degraded_still_serves() {
        let (status, Json(report)) = readiness(vec![
            HealthCheck::healthy("registration_store"),
            HealthCheck::degraded("cancellation_store", "300 effects pending"),
        ]);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_readiness_unhealthy_is_503() {
        let (status, Json(report)) = readiness(vec![
            HealthCheck::healthy("registration_store"),
            HealthCheck::unhealthy("documents", "connection refused"),
        ]);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
