//! Configuration management for the registration service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A value that is unset or does not parse falls back to its default.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Configuration that cannot be turned into a running server.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `HOST`/`PORT` do not form a socket address
    #[error("Invalid bind address {0}")]
    InvalidAddress(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,
    /// Document store backend
    pub database: DatabaseConfig,
    /// Workflow request handling
    pub workflow: WorkflowConfig,
    /// Admin sign-in
    pub admin: AdminConfig,
    /// CSV export
    pub export: ExportConfig,
    /// Prometheus exporter
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Seed the sample event into the `events` collection at startup
    pub seed_sample_events: bool,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; the in-memory store is used when unset
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// How long a handler waits for a workflow outcome, in milliseconds
    pub timeout_ms: u64,
    /// Running effects per store above which readiness reports degraded
    pub backlog_threshold: usize,
}

/// Admin sign-in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Seed admin account email; no account is seeded when unset
    pub email: Option<String>,
    /// Seed admin account password
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Session lifetime in minutes
    pub session_ttl_minutes: u64,
    /// How often expired sessions are swept, in minutes
    pub session_purge_minutes: u64,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Offset from UTC used for timestamps and file names (default: 9, KST)
    pub utc_offset_hours: i32,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metrics server host (for Prometheus scraping)
    pub host: String,
    /// Metrics server port; disabled when 0
    pub port: u16,
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("PORT", 8080),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT", 30),
                seed_sample_events: parsed("SEED_SAMPLE_EVENTS", true),
            },
            database: DatabaseConfig {
                url: non_empty("DATABASE_URL"),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
            },
            workflow: WorkflowConfig {
                timeout_ms: parsed("WORKFLOW_TIMEOUT_MS", 10_000),
                backlog_threshold: parsed("WORKFLOW_BACKLOG_THRESHOLD", 256),
            },
            admin: AdminConfig {
                email: non_empty("ADMIN_EMAIL"),
                password: non_empty("ADMIN_PASSWORD"),
                session_ttl_minutes: parsed("SESSION_TTL_MINUTES", 480),
                session_purge_minutes: parsed("SESSION_PURGE_MINUTES", 10),
            },
            export: ExportConfig {
                utc_offset_hours: parsed("EXPORT_UTC_OFFSET_HOURS", 9),
            },
            metrics: MetricsConfig {
                host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("METRICS_PORT", 9090),
            },
        }
    }

    /// Address the HTTP server binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if host and port do not parse.
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let address = format!("{}:{}", self.server.host, self.server.port);
        address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(address))
    }

    /// Address of the Prometheus exporter, if enabled.
    #[must_use]
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        if self.metrics.port == 0 {
            return None;
        }
        format!("{}:{}", self.metrics.host, self.metrics.port)
            .parse()
            .ok()
    }

    /// Workflow response timeout.
    #[must_use]
    pub const fn workflow_timeout(&self) -> Duration {
        Duration::from_millis(self.workflow.timeout_ms)
    }

    /// Admin session lifetime.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.admin.session_ttl_minutes.saturating_mul(60))
    }

    /// Period of the expired-session sweep, at least one minute.
    #[must_use]
    pub fn session_purge_interval(&self) -> Duration {
        Duration::from_secs(self.admin.session_purge_minutes.max(1).saturating_mul(60))
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}
