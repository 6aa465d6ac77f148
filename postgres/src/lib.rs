//! `PostgreSQL` document store for Roster.
//!
//! This crate implements the `DocumentStore` trait from `roster-core` on a
//! single JSONB table:
//!
//! - Every collection shares the `documents` table, keyed by `(collection, id)`
//! - Equality filters compile to JSONB containment (`data @> $filters`)
//! - Writes announce the collection name with `pg_notify` on
//!   [`CHANGE_CHANNEL`], and subscriptions re-query on each notification
//!
//! # Example
//!
//! ```ignore
//! use roster_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let documents = PostgresDocumentStore::connect("postgres://localhost/roster", 10).await?;
//!     documents.migrate().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Ordering
//!
//! Ordering uses JSONB comparison, which agrees with the in-memory store as
//! long as every document stores the order field with the same JSON type.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use roster_core::document::{
    Direction, Document, DocumentError, DocumentFuture, DocumentStore, Fields, Query, Result,
    SnapshotStream,
};
use roster_runtime::metrics::DocumentMetrics;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use std::time::Instant;

/// Notification channel carrying the name of each written collection.
pub const CHANGE_CHANNEL: &str = "roster_documents";

/// `PostgreSQL`-backed document store.
///
/// Clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect to a database and build a pool.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| DocumentError::Storage(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `documents` table and its indexes if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DocumentError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let start = Instant::now();

        let filters: Fields = query
            .filters()
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let (order_field, order_sql) = match query.ordering() {
            Some((field, Direction::Ascending)) => {
                (Some(field.to_string()), "data -> $3 ASC NULLS FIRST, id")
            },
            Some((field, Direction::Descending)) => {
                (Some(field.to_string()), "data -> $3 DESC NULLS LAST, id DESC")
            },
            None => (None, "id"),
        };

        #[allow(clippy::cast_possible_wrap)] // Limits are small
        let limit = query.max_results().map(|l| l as i64);

        let sql = format!(
            "SELECT id, data FROM documents
             WHERE collection = $1 AND data @> $2
             ORDER BY {order_sql}
             LIMIT $4"
        );

        let rows: Vec<(String, Value)> = sqlx::query_as(&sql)
            .bind(collection)
            .bind(Value::Object(filters))
            .bind(order_field)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DocumentMetrics::record_error("query");
                DocumentError::Storage(format!("Failed to query {collection}: {e}"))
            })?;

        let documents: Vec<Document> = rows
            .into_iter()
            .map(|(id, data)| to_document(id, data))
            .collect::<Result<_>>()?;

        DocumentMetrics::record_query(documents.len(), start.elapsed());
        Ok(documents)
    }

    async fn notify(&self, collection: &str) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(|e| DocumentError::Storage(format!("Failed to notify: {e}")))?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (collection, id) DO UPDATE
             SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(data))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DocumentMetrics::record_error("set");
            DocumentError::Storage(format!("Failed to write {collection}/{id}: {e}"))
        })?;

        DocumentMetrics::record_write("set");
        self.notify(collection).await
    }
}

fn to_document(id: String, data: Value) -> Result<Document> {
    match data {
        Value::Object(fields) => Ok(Document::new(id, fields)),
        other => Err(DocumentError::Serialization(format!(
            "Document {id} is not an object: {other}"
        ))),
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn get(&self, collection: &str, id: &str) -> DocumentFuture<'_, Option<Document>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let start = Instant::now();
            let row: Option<(Value,)> =
                sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                    .bind(&collection)
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| {
                        DocumentMetrics::record_error("get");
                        DocumentError::Storage(format!("Failed to get {collection}/{id}: {e}"))
                    })?;

            DocumentMetrics::record_query(usize::from(row.is_some()), start.elapsed());
            row.map(|(data,)| to_document(id, data)).transpose()
        })
    }

    fn query(&self, collection: &str, query: Query) -> DocumentFuture<'_, Vec<Document>> {
        let collection = collection.to_string();
        Box::pin(async move { self.run_query(&collection, &query).await })
    }

    fn add(&self, collection: &str, data: Fields) -> DocumentFuture<'_, String> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = uuid::Uuid::now_v7().simple().to_string();
            sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
                .bind(&collection)
                .bind(&id)
                .bind(Value::Object(data))
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DocumentMetrics::record_error("add");
                    DocumentError::Storage(format!("Failed to add to {collection}: {e}"))
                })?;

            DocumentMetrics::record_write("add");
            tracing::debug!(collection = %collection, id = %id, "Document added");
            self.notify(&collection).await?;
            Ok(id)
        })
    }

    fn set(&self, collection: &str, id: &str, data: Fields) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move { self.upsert(&collection, &id, data).await })
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE documents SET data = data || $3, updated_at = now()
                 WHERE collection = $1 AND id = $2",
            )
            .bind(&collection)
            .bind(&id)
            .bind(Value::Object(fields))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DocumentMetrics::record_error("update");
                DocumentError::Storage(format!("Failed to update {collection}/{id}: {e}"))
            })?;

            if result.rows_affected() == 0 {
                return Err(DocumentError::NotFound { collection, id });
            }

            DocumentMetrics::record_write("update");
            self.notify(&collection).await
        })
    }

    fn delete(&self, collection: &str, id: &str) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(&collection)
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DocumentMetrics::record_error("delete");
                    DocumentError::Storage(format!("Failed to delete {collection}/{id}: {e}"))
                })?;

            DocumentMetrics::record_write("delete");
            if result.rows_affected() > 0 {
                self.notify(&collection).await?;
            }
            Ok(())
        })
    }

    fn subscribe(&self, collection: &str, query: Query) -> DocumentFuture<'_, SnapshotStream> {
        let collection = collection.to_string();
        let store = self.clone();
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&store.pool)
                .await
                .map_err(|e| DocumentError::Subscription(format!("Failed to listen: {e}")))?;
            listener
                .listen(CHANGE_CHANNEL)
                .await
                .map_err(|e| DocumentError::Subscription(format!("Failed to listen: {e}")))?;

            tracing::debug!(collection = %collection, "Snapshot subscription opened");

            let stream = async_stream::stream! {
                let _guard = SubscriptionGuard::new();
                yield store.run_query(&collection, &query).await;

                loop {
                    match listener.recv().await {
                        Ok(notification) if notification.payload() == collection => {
                            yield store.run_query(&collection, &query).await;
                        },
                        Ok(_) => {},
                        Err(e) => {
                            yield Err(DocumentError::Subscription(format!(
                                "Change feed for {collection} closed: {e}"
                            )));
                            break;
                        },
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn ping(&self) -> DocumentFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| DocumentError::Storage(format!("Ping failed: {e}")))?;
            Ok(())
        })
    }
}

/// Keeps the active-subscription gauge in step with live streams.
struct SubscriptionGuard;

impl SubscriptionGuard {
    fn new() -> Self {
        DocumentMetrics::record_subscribe();
        Self
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        DocumentMetrics::record_unsubscribe();
    }
}
