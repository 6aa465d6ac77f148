//! HTTP server module for the registration service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Readiness checks over the workflow stores and the document store
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, StateOptions};
