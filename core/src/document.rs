//! Document store abstraction.
//!
//! Registrations, the waiting list, settings, events, notices and admin
//! users are all kept as JSON documents grouped into named collections.
//! The [`DocumentStore`] trait is the only way workflows touch persistence,
//! so the same reducers run against the in-memory store in tests and the
//! `PostgreSQL` store in production.
//!
//! # Change feeds
//!
//! [`DocumentStore::subscribe`] returns a [`SnapshotStream`]: the first item
//! is the current result of the query, and every later item is a fresh
//! snapshot taken after a write to the collection. Dropping the stream
//! unsubscribes.
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let query = Query::new().order_by("timestamp", Direction::Ascending);
//! let mut snapshots = store.subscribe("waitingList", query).await?;
//! while let Some(snapshot) = snapshots.next().await {
//!     render(snapshot?);
//! }
//! ```

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Field map stored in a document.
pub type Fields = Map<String, Value>;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The addressed document does not exist
    #[error("Document {collection}/{id} not found")]
    NotFound {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },

    /// Backend storage failure (connection, query, lock)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The change feed could not be established or broke
    #[error("Subscription error: {0}")]
    Subscription(String),
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// A stored document: its id within the collection plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned or caller-chosen id, unique within the collection
    pub id: String,
    /// Document fields
    pub data: Fields,
}

impl Document {
    /// Create a document from an id and its fields.
    #[must_use]
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Look up a single field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Decode the fields into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Serialization`] if the fields do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            DocumentError::Serialization(format!("Failed to decode document {}: {e}", self.id))
        })
    }
}

/// Encode a typed value into document fields.
///
/// # Errors
///
/// Returns [`DocumentError::Serialization`] if `value` does not serialize to
/// a JSON object.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(DocumentError::Serialization(format!(
            "Expected a JSON object, got {other}"
        ))),
        Err(e) => Err(DocumentError::Serialization(e.to_string())),
    }
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// Equality filters, an optional ordering and an optional limit.
///
/// Backends must produce the same result as [`Query::apply`] does over the
/// full collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    /// Match every document, in unspecified order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only documents whose `field` equals `value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Order results by `field`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Equality filters in insertion order.
    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    /// Ordering, if any.
    #[must_use]
    pub fn ordering(&self) -> Option<(&str, Direction)> {
        self.order_by
            .as_ref()
            .map(|(field, direction)| (field.as_str(), *direction))
    }

    /// Limit, if any.
    #[must_use]
    pub const fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Whether `document` passes every filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| document.field(field) == Some(expected))
    }

    /// Filter, sort and truncate `documents`.
    ///
    /// Documents lacking the order field sort first. Ties on the order
    /// field, and every document when there is no ordering, fall back to
    /// document id, which [`DocumentStore::add`] keeps in creation order.
    #[must_use]
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected: Vec<Document> =
            documents.into_iter().filter(|d| self.matches(d)).collect();

        selected.sort_by(|a, b| {
            let Some((field, direction)) = &self.order_by else {
                return a.id.cmp(&b.id);
            };
            let ordering = compare_fields(a.field(field), b.field(field))
                .then_with(|| a.id.cmp(&b.id));
            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

/// Total order over optional JSON values used by [`Query::apply`].
///
/// Missing < null < bool < number < string < array/object.
#[must_use]
pub fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    const fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_) | Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Boxed future returned by [`DocumentStore`] methods.
pub type DocumentFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Stream of query snapshots produced by [`DocumentStore::subscribe`].
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<Document>>> + Send>>;

/// Trait for document store implementations.
///
/// # Consistency
///
/// Each call is an independent operation. Nothing here is transactional:
/// a read followed by a write can observe state that another caller
/// changes in between.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn DocumentStore>`). Reducers capture
/// the store inside effects, which requires a concrete, `'static` handle.
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend fails.
    fn get(&self, collection: &str, id: &str) -> DocumentFuture<'_, Option<Document>>;

    /// Run a query against a collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend fails.
    fn query(&self, collection: &str, query: Query) -> DocumentFuture<'_, Vec<Document>>;

    /// Insert a document under a freshly generated id and return that id.
    ///
    /// Ids from one process compare in creation order, so they break ties
    /// between documents that share an order-field value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend fails.
    fn add(&self, collection: &str, data: Fields) -> DocumentFuture<'_, String>;

    /// Create or replace the document at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend fails.
    fn set(&self, collection: &str, id: &str, data: Fields) -> DocumentFuture<'_, ()>;

    /// Overwrite the given fields of an existing document, keeping the rest.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::NotFound`] if the document does not exist.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> DocumentFuture<'_, ()>;

    /// Delete a document. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend fails.
    fn delete(&self, collection: &str, id: &str) -> DocumentFuture<'_, ()>;

    /// Subscribe to snapshots of a query.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Subscription`] if the change feed cannot be
    /// established.
    fn subscribe(&self, collection: &str, query: Query) -> DocumentFuture<'_, SnapshotStream>;

    /// Cheap round trip used by readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Storage`] if the backend is unreachable.
    fn ping(&self) -> DocumentFuture<'_, ()>;
}
