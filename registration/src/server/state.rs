//! Application state for the registration HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Workflow stores (submit, cancel, edit, settings)
//! - Read-side queries and the live roster feed
//! - Admin authentication

use crate::auth::{AdminAuth, IdentityProvider, SessionStore};
use crate::config::Config;
use crate::export::CsvExporter;
use crate::live::RosterFeed;
use crate::queries::RosterQueries;
use crate::workflows::{RosterWorkflows, WorkflowEnvironment};
use axum::extract::FromRef;
use roster_core::document::DocumentStore;
use roster_core::environment::Clock;
use roster_runtime::StoreConfig;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`AppState::new`].
#[derive(Debug, Clone, Copy)]
pub struct StateOptions {
    /// How long a handler waits for a workflow outcome
    pub workflow_timeout: Duration,
    /// Running effects per workflow store before readiness degrades
    pub workflow_backlog_threshold: usize,
    /// Admin session lifetime
    pub session_ttl: Duration,
    /// Offset from UTC for exported times
    pub export_utc_offset_hours: i32,
    /// Budget for the document store ping in `/ready`
    pub readiness_timeout: Duration,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            workflow_timeout: Duration::from_secs(10),
            workflow_backlog_threshold: 256,
            session_ttl: Duration::from_secs(8 * 60 * 60),
            export_utc_offset_hours: 9,
            readiness_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for StateOptions {
    fn from(config: &Config) -> Self {
        Self {
            workflow_timeout: config.workflow_timeout(),
            workflow_backlog_threshold: config.workflow.backlog_threshold,
            session_ttl: config.session_ttl(),
            export_utc_offset_hours: config.export.utc_offset_hours,
            ..Self::default()
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// It's cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Request/response access to the workflows
    pub workflows: RosterWorkflows,
    /// Lookup, listing, dashboard, notices, events
    pub queries: RosterQueries,
    /// Admin sign-in and session checks
    pub auth: AdminAuth,
    /// Combined roster subscriptions
    pub feed: RosterFeed,
    /// CSV rendering
    pub exporter: CsvExporter,
    /// Backing document store, pinged by readiness
    pub documents: Arc<dyn DocumentStore>,
    /// Time source for export names
    pub clock: Arc<dyn Clock>,
    /// Budget for the readiness ping
    pub readiness_timeout: Duration,
}

impl AppState {
    /// Wire every service over one document store.
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn IdentityProvider>,
        options: StateOptions,
    ) -> Self {
        let env = WorkflowEnvironment::new(Arc::clone(&documents), Arc::clone(&clock));
        let records = env.records.clone();

        Self {
            workflows: RosterWorkflows::with_config(
                env,
                options.workflow_timeout,
                StoreConfig::default().with_backlog_threshold(options.workflow_backlog_threshold),
            ),
            queries: RosterQueries::new(records.clone()),
            auth: AdminAuth::new(
                identity,
                SessionStore::new(Arc::clone(&clock), options.session_ttl),
                records.clone(),
            ),
            feed: RosterFeed::new(records),
            exporter: CsvExporter::with_utc_offset_hours(options.export_utc_offset_hours),
            documents,
            clock,
            readiness_timeout: options.readiness_timeout,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("workflows", &self.workflows)
            .field("readiness_timeout", &self.readiness_timeout)
            .finish_non_exhaustive()
    }
}

// Lets the admin extractor reach the auth service
impl FromRef<AppState> for AdminAuth {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth.clone()
    }
}
