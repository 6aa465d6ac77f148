//! In-memory document store for fast, deterministic testing.
//!
//! [`InMemoryDocumentStore`] keeps every collection in a `BTreeMap` behind a
//! lock and announces writes on a broadcast channel, which drives
//! [`DocumentStore::subscribe`] snapshots. It is also what the server runs
//! on when no database URL is configured.

use roster_core::document::{
    Document, DocumentError, DocumentFuture, DocumentStore, Fields, Query, Result,
    SnapshotStream,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// Write operations that can be made to fail with
/// [`InMemoryDocumentStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// [`DocumentStore::add`]
    Add,
    /// [`DocumentStore::set`]
    Set,
    /// [`DocumentStore::update`]
    Update,
    /// [`DocumentStore::delete`]
    Delete,
}

/// In-memory document store.
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use roster_testing::InMemoryDocumentStore;
/// use roster_core::document::{DocumentStore, Query};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// let fields = json!({ "name": "홍길동" }).as_object().cloned().unwrap_or_default();
/// let id = store.add("applications", fields).await?;
///
/// assert!(store.get("applications", &id).await?.is_some());
/// assert_eq!(store.len("applications"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<String>,
    injected_failures: Arc<Mutex<Vec<(WriteOp, String)>>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
            injected_failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the next `op` on `collection` fail with a storage error.
    ///
    /// Each call arms exactly one failure.
    pub fn fail_next(&self, op: WriteOp, collection: impl Into<String>) {
        if let Ok(mut failures) = self.injected_failures.lock() {
            failures.push((op, collection.into()));
        }
    }

    /// Number of documents in a collection
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.read()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Whether a collection has no documents
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// All documents of a collection in id order
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.read()
            .map(|c| Self::collect(&c, collection))
            .unwrap_or_default()
    }

    /// Remove every document from every collection
    pub fn clear(&self) {
        if let Ok(mut collections) = self.collections.write() {
            let names: Vec<String> = collections.keys().cloned().collect();
            collections.clear();
            drop(collections);
            for name in names {
                self.notify(name);
            }
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| DocumentError::Storage("document lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| DocumentError::Storage("document lock poisoned".to_string()))
    }

    fn collect(collections: &Collections, collection: &str) -> Vec<Document> {
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn snapshot(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let collections = self.read()?;
        Ok(query.apply(Self::collect(&collections, collection)))
    }

    fn check_injected(&self, op: WriteOp, collection: &str) -> Result<()> {
        let mut failures = self
            .injected_failures
            .lock()
            .map_err(|_| DocumentError::Storage("failure lock poisoned".to_string()))?;

        if let Some(index) = failures
            .iter()
            .position(|(o, c)| *o == op && c == collection)
        {
            failures.remove(index);
            return Err(DocumentError::Storage(format!(
                "injected {op:?} failure on {collection}"
            )));
        }
        Ok(())
    }

    fn notify(&self, collection: String) {
        // No receivers just means nobody is subscribed
        let _ = self.changes.send(collection);
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: &str, id: &str) -> DocumentFuture<'_, Option<Document>> {
        let result = self.read().map(|collections| {
            collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .map(|data| Document::new(id, data.clone()))
        });
        Box::pin(async move { result })
    }

    fn query(&self, collection: &str, query: Query) -> DocumentFuture<'_, Vec<Document>> {
        let result = self.snapshot(collection, &query);
        Box::pin(async move { result })
    }

    fn add(&self, collection: &str, data: Fields) -> DocumentFuture<'_, String> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check_injected(WriteOp::Add, &collection)?;
            let id = uuid::Uuid::now_v7().simple().to_string();
            self.write()?
                .entry(collection.clone())
                .or_default()
                .insert(id.clone(), data);
            self.notify(collection);
            Ok(id)
        })
    }

    fn set(&self, collection: &str, id: &str, data: Fields) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_injected(WriteOp::Set, &collection)?;
            self.write()?
                .entry(collection.clone())
                .or_default()
                .insert(id, data);
            self.notify(collection);
            Ok(())
        })
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_injected(WriteOp::Update, &collection)?;
            {
                let mut collections = self.write()?;
                let existing = collections
                    .get_mut(&collection)
                    .and_then(|docs| docs.get_mut(&id))
                    .ok_or_else(|| DocumentError::NotFound {
                        collection: collection.clone(),
                        id: id.clone(),
                    })?;
                existing.extend(fields);
            }
            self.notify(collection);
            Ok(())
        })
    }

    fn delete(&self, collection: &str, id: &str) -> DocumentFuture<'_, ()> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_injected(WriteOp::Delete, &collection)?;
            let removed = self
                .write()?
                .get_mut(&collection)
                .and_then(|docs| docs.remove(&id))
                .is_some();
            if removed {
                self.notify(collection);
            }
            Ok(())
        })
    }

    fn subscribe(&self, collection: &str, query: Query) -> DocumentFuture<'_, SnapshotStream> {
        let collection = collection.to_string();
        let store = self.clone();
        Box::pin(async move {
            // Subscribe before the first snapshot so no write slips between them
            let mut changes = store.changes.subscribe();

            let stream = async_stream::stream! {
                yield store.snapshot(&collection, &query);

                loop {
                    match changes.recv().await {
                        Ok(changed) if changed == collection => {
                            yield store.snapshot(&collection, &query);
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            yield store.snapshot(&collection, &query);
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn ping(&self) -> DocumentFuture<'_, ()> {
        let result = self.read().map(|_| ());
        Box::pin(async move { result })
    }
}
