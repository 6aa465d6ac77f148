//! Prometheus metrics for observability and monitoring.
//!
//! This module describes and records metrics for:
//! - Store command handling and reducer timing
//! - Document store reads, writes and subscriptions
//! - Registration workflow outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use roster_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Installs the global recorder. The binary exposes [`MetricsServer::render`]
/// on its own listener for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint will bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a
    /// warning and leaves `handle()` empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - scrape at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to execute reducers"
    );
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, by type"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
    describe_counter!(
        "store.requests.timed_out",
        "Requests whose outcome did not arrive before the wait timeout"
    );

    // Document store
    describe_counter!(
        "documents.reads.total",
        "Total number of document reads and queries"
    );
    describe_counter!(
        "documents.writes.total",
        "Total number of document writes, by operation"
    );
    describe_counter!(
        "documents.errors.total",
        "Total number of failed document operations"
    );
    describe_histogram!(
        "documents.query.duration_seconds",
        "Time taken to run document queries"
    );
    describe_gauge!(
        "documents.subscriptions.active",
        "Number of open snapshot subscriptions"
    );

    // Workflows
    describe_counter!(
        "registration.submissions",
        "Registration submissions, by outcome"
    );
    describe_counter!(
        "registration.cancellations",
        "Cancellations, by whether a waitlist entry was promoted"
    );
    describe_counter!("registration.edits", "Self-service edits, by outcome");
    describe_histogram!(
        "registration.workflow.duration_seconds",
        "Time from command to terminal action"
    );
}

/// Document store metrics recorder.
pub struct DocumentMetrics;

impl DocumentMetrics {
    /// Record a read or query returning `count` documents.
    pub fn record_query(count: usize, duration: Duration) {
        counter!("documents.reads.total").increment(count as u64);
        histogram!("documents.query.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a write (`add`, `set`, `update` or `delete`).
    pub fn record_write(operation: &'static str) {
        counter!("documents.writes.total", "operation" => operation).increment(1);
    }

    /// Record a failed operation.
    pub fn record_error(operation: &'static str) {
        counter!("documents.errors.total", "operation" => operation).increment(1);
    }

    /// Record a subscription being opened.
    pub fn record_subscribe() {
        gauge!("documents.subscriptions.active").increment(1.0);
    }

    /// Record a subscription being dropped.
    pub fn record_unsubscribe() {
        gauge!("documents.subscriptions.active").decrement(1.0);
    }
}

/// Workflow outcome recorder.
pub struct WorkflowMetrics;

impl WorkflowMetrics {
    /// Record a submission outcome (`accepted`, `waitlisted`, `closed`, ...).
    pub fn record_submission(outcome: &'static str) {
        counter!("registration.submissions", "outcome" => outcome).increment(1);
    }

    /// Record a completed cancellation.
    pub fn record_cancellation(promoted: bool) {
        let promoted = if promoted { "true" } else { "false" };
        counter!("registration.cancellations", "promoted" => promoted).increment(1);
    }

    /// Record an edit outcome.
    pub fn record_edit(outcome: &'static str) {
        counter!("registration.edits", "outcome" => outcome).increment(1);
    }

    /// Record how long a request waited for its terminal action.
    pub fn record_duration(workflow: &'static str, duration: Duration) {
        histogram!("registration.workflow.duration_seconds", "workflow" => workflow)
            .record(duration.as_secs_f64());
    }
}
