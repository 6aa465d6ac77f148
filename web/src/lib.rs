//! Axum integration for Roster.
//!
//! This crate holds the HTTP plumbing that is independent of the
//! registration domain:
//!
//! - [`AppError`]: maps store, document and domain failures to JSON error responses
//! - Extractors for correlation ids and bearer tokens
//! - A correlation-id layer that wraps every request in a tracing span
//! - Liveness/readiness handlers
//! - A WebSocket feed that forwards any snapshot stream to the client
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract data** from the request (JSON, headers, bearer token)
//! 3. **Build Action** and send it through a `Store`
//! 4. **Wait** for the terminal action with `send_and_wait_for`
//! 5. **Map result** to an HTTP response
//!
//! # Example
//!
//! ```ignore
//! use roster_web::{AppError, correlation_id_layer};
//! use axum::{Router, routing::post, Json};
//!
//! async fn submit(
//!     State(state): State<AppState>,
//!     Json(form): Json<RegistrationForm>,
//! ) -> Result<Json<SubmissionResponse>, AppError> {
//!     let outcome = state.registration.submit(form).await?;
//!     Ok(Json(outcome.into()))
//! }
//!
//! let app = Router::new()
//!     .route("/api/applications", post(submit))
//!     .layer(correlation_id_layer())
//!     .with_state(app_state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
