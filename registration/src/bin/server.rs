//! Registration Server
//!
//! HTTP server for event registration.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs the Prometheus recorder and its scrape endpoint
//! - Connects to `PostgreSQL`, or falls back to the in-memory document store
//! - Seeds the admin account and the sample event
//! - Sweeps expired admin sessions in the background
//! - Serves the API until Ctrl+C, then drains the workflow stores
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/roster \
//! ADMIN_EMAIL=admin@example.com ADMIN_PASSWORD=change-me \
//! cargo run --bin server
//! ```

use anyhow::Context;
use axum::{Router, routing::get};
use registration::auth::{IdentityProvider, InMemoryIdentityProvider, seed_admin};
use registration::queries::sample_events;
use registration::{AppState, Config, RosterRepository, StateOptions, build_router};
use roster_core::document::DocumentStore;
use roster_core::environment::{Clock, SystemClock};
use roster_postgres::PostgresDocumentStore;
use roster_runtime::metrics::MetricsServer;
use roster_testing::InMemoryDocumentStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,registration=debug,roster_runtime=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting registration server...");

    let config = Config::from_env();
    let bind_address = config.bind_address()?;
    tracing::info!(
        address = %bind_address,
        postgres = config.database.url.is_some(),
        "Configuration loaded"
    );

    if let Some(address) = config.metrics_address() {
        start_metrics(address).await?;
    }

    let documents = open_documents(&config).await?;
    let records = RosterRepository::new(Arc::clone(&documents));

    let identity = InMemoryIdentityProvider::new();
    match (&config.admin.email, &config.admin.password) {
        (Some(email), Some(password)) => {
            seed_admin(&identity, &records, email, password)
                .await
                .context("Failed to seed admin account")?;
        },
        _ => tracing::warn!("ADMIN_EMAIL/ADMIN_PASSWORD unset; admin sign-in is unavailable"),
    }

    if config.server.seed_sample_events {
        for event in sample_events() {
            records
                .put_event(&event)
                .await
                .context("Failed to seed sample event")?;
        }
        tracing::info!("✓ Sample events seeded");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
    let state = AppState::new(documents, clock, identity, StateOptions::from(&config));
    let workflows = state.workflows.clone();
    let sweeper = state
        .auth
        .sessions()
        .spawn_sweeper(config.session_purge_interval());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Registration server is running");
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down gracefully...");
    sweeper.abort();
    if let Err(error) = workflows.shutdown(config.shutdown_timeout()).await {
        tracing::warn!(error = %error, "Workflow stores did not drain in time");
    }
    tracing::info!("✓ Shutdown complete");
    Ok(())
}

async fn open_documents(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let Some(url) = &config.database.url else {
        tracing::warn!("DATABASE_URL unset; using the in-memory document store");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    };

    let store = PostgresDocumentStore::connect(url, config.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store.migrate().await.context("Failed to run migrations")?;
    tracing::info!("✓ PostgreSQL document store ready");
    Ok(Arc::new(store))
}

async fn start_metrics(address: std::net::SocketAddr) -> anyhow::Result<()> {
    let mut metrics = MetricsServer::new(address);
    metrics.start().context("Failed to install metrics recorder")?;

    let metrics = Arc::new(metrics);
    let router = Router::new().route(
        "/metrics",
        get(move || {
            let body = metrics.render().unwrap_or_default();
            async move { body }
        }),
    );
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint {address}"))?;

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(error = %error, "Metrics endpoint stopped");
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for Ctrl+C");
    }
}
