//! Router configuration for the registration service.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::readiness_check;
use super::state::AppState;
use crate::api::{admin, applications, public};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use roster_web::{correlation_id_layer, handlers::health_check};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// Configures:
/// - Health checks (no authentication)
/// - Public event, notice and settings reads
/// - Self-service registration endpoints
/// - Admin endpoints (bearer session)
///
/// Every request runs inside a correlation-id span and an HTTP trace span.
/// CORS is permissive.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/logout", post(admin::logout))
        .route("/dashboard", get(admin::dashboard))
        .route("/roster", get(admin::roster))
        .route("/settings/toggle", post(admin::toggle))
        .route("/settings/capacity", put(admin::set_capacity))
        .route("/export/:list", get(admin::export))
        .route("/live", get(admin::live))
        .route("/:list/:id", delete(admin::remove));

    let api_routes = Router::new()
        // Public reads
        .route("/events", get(public::list_events))
        .route("/events/:id", get(public::get_event))
        .route("/notices", get(public::list_notices))
        .route("/settings", get(public::get_settings))
        // Self-service
        .route("/applications", post(applications::submit))
        .route("/applications/lookup", post(applications::lookup))
        .route("/applications/:list/:id", put(applications::amend))
        .route("/applications/:list/:id/cancel", post(applications::cancel))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
