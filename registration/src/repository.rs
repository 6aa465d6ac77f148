//! Typed access to the roster collections.
//!
//! [`RosterRepository`] is the only place that knows collection names and
//! document keys. Workflows, queries and the live feed all go through it.

use crate::types::{
    EVENTS_COLLECTION, EventInfo, ListKind, NOTICES_COLLECTION, Notice, Record, RecordId,
    RecordRef, Registrant, SETTINGS_COLLECTION, SETTINGS_DOCUMENT, Settings, USERS_COLLECTION,
    UserProfile,
};
use roster_core::document::{
    Direction, Document, DocumentStore, Fields, Query, Result, SnapshotStream, encode,
};
use std::sync::Arc;

/// Roster persistence over any [`DocumentStore`].
///
/// Clones share the underlying store.
#[derive(Clone)]
pub struct RosterRepository {
    documents: Arc<dyn DocumentStore>,
}

impl RosterRepository {
    /// Wrap a document store.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// The underlying document store.
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Query selecting a whole list, oldest first.
    ///
    /// Records sharing a timestamp keep insertion order through the
    /// document id tie-break.
    #[must_use]
    pub fn list_query() -> Query {
        Query::new().order_by("timestamp", Direction::Ascending)
    }

    // ---------------------------------------------------------------------
    // Registrant records
    // ---------------------------------------------------------------------

    /// Every record in `list`, ordered by ascending timestamp.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn list(&self, list: ListKind) -> Result<Vec<Record>> {
        let documents = self
            .documents
            .query(list.collection(), Self::list_query())
            .await?;
        decode_records(list, &documents)
    }

    /// Number of records in `list`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn count(&self, list: ListKind) -> Result<usize> {
        let documents = self.documents.query(list.collection(), Query::new()).await?;
        Ok(documents.len())
    }

    /// Load one record.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn get(&self, reference: &RecordRef) -> Result<Option<Record>> {
        self.documents
            .get(reference.list.collection(), reference.id.as_str())
            .await?
            .map(|document| decode_record(reference.list, &document))
            .transpose()
    }

    /// First record in `list` with the given student id.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn find_by_student_id(
        &self,
        list: ListKind,
        student_id: &str,
    ) -> Result<Option<Record>> {
        let query = Query::new().where_eq("studentId", student_id).limit(1);
        let documents = self.documents.query(list.collection(), query).await?;
        documents
            .first()
            .map(|document| decode_record(list, document))
            .transpose()
    }

    /// First record in `list` matching both name and student id exactly.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn find_by_identity(
        &self,
        list: ListKind,
        name: &str,
        student_id: &str,
    ) -> Result<Option<Record>> {
        let query = Query::new()
            .where_eq("name", name)
            .where_eq("studentId", student_id)
            .limit(1);
        let documents = self.documents.query(list.collection(), query).await?;
        documents
            .first()
            .map(|document| decode_record(list, document))
            .transpose()
    }

    /// Earliest waitlist entry.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn waitlist_head(&self) -> Result<Option<Record>> {
        let query = Self::list_query().limit(1);
        let documents = self
            .documents
            .query(ListKind::Waitlist.collection(), query)
            .await?;
        documents
            .first()
            .map(|document| decode_record(ListKind::Waitlist, document))
            .transpose()
    }

    /// 1-based position of `id` in the waitlist, as ordered by [`Self::list_query`].
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn waitlist_position(&self, id: &RecordId) -> Result<Option<usize>> {
        let documents = self
            .documents
            .query(ListKind::Waitlist.collection(), Self::list_query())
            .await?;
        Ok(documents
            .iter()
            .position(|document| document.id == id.as_str())
            .map(|index| index + 1))
    }

    /// Store a new record in `list` and return its id.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn insert(&self, list: ListKind, registrant: &Registrant) -> Result<RecordId> {
        let fields = encode(registrant)?;
        let id = self.documents.add(list.collection(), fields).await?;
        tracing::debug!(list = %list, id = %id, student_id = %registrant.student_id, "Record inserted");
        Ok(RecordId::from(id))
    }

    /// Overwrite some fields of an existing record.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::NotFound` if the record is gone.
    pub async fn update(&self, reference: &RecordRef, fields: Fields) -> Result<()> {
        self.documents
            .update(reference.list.collection(), reference.id.as_str(), fields)
            .await
    }

    /// Delete a record. Deleting a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn delete(&self, reference: &RecordRef) -> Result<()> {
        self.documents
            .delete(reference.list.collection(), reference.id.as_str())
            .await?;
        tracing::debug!(record = %reference, "Record deleted");
        Ok(())
    }

    /// Change feed of a whole list.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Subscription` if the feed cannot start.
    pub async fn subscribe_list(&self, list: ListKind) -> Result<SnapshotStream> {
        self.documents
            .subscribe(list.collection(), Self::list_query())
            .await
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    /// The settings singleton, if it has been created.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn settings(&self) -> Result<Option<Settings>> {
        self.documents
            .get(SETTINGS_COLLECTION, SETTINGS_DOCUMENT)
            .await?
            .map(|document| document.decode())
            .transpose()
    }

    /// Write the whole settings singleton.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn put_settings(&self, settings: &Settings) -> Result<()> {
        let fields = encode(settings)?;
        self.documents
            .set(SETTINGS_COLLECTION, SETTINGS_DOCUMENT, fields)
            .await
    }

    /// Overwrite some settings fields.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::NotFound` if the singleton does not exist.
    pub async fn update_settings(&self, fields: Fields) -> Result<()> {
        self.documents
            .update(SETTINGS_COLLECTION, SETTINGS_DOCUMENT, fields)
            .await
    }

    /// Change feed of the settings singleton.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Subscription` if the feed cannot start.
    pub async fn subscribe_settings(&self) -> Result<SnapshotStream> {
        self.documents
            .subscribe(SETTINGS_COLLECTION, Query::new())
            .await
    }

    // ---------------------------------------------------------------------
    // Events, notices, users
    // ---------------------------------------------------------------------

    /// Event details by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn event(&self, id: &str) -> Result<Option<EventInfo>> {
        let Some(document) = self.documents.get(EVENTS_COLLECTION, id).await? else {
            return Ok(None);
        };
        let mut event: EventInfo = document.decode()?;
        event.id = document.id;
        Ok(Some(event))
    }

    /// Store event details under `event.id`.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn put_event(&self, event: &EventInfo) -> Result<()> {
        let fields = encode(event)?;
        self.documents.set(EVENTS_COLLECTION, &event.id, fields).await
    }

    /// All notices, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn notices(&self) -> Result<Vec<Notice>> {
        let query = Query::new().order_by("createdAt", Direction::Descending);
        let documents = self.documents.query(NOTICES_COLLECTION, query).await?;
        documents
            .into_iter()
            .map(|document| {
                let mut notice: Notice = document.decode()?;
                notice.id = document.id;
                Ok(notice)
            })
            .collect()
    }

    /// Profile of a signed-in user.
    ///
    /// # Errors
    ///
    /// Propagates store failures and undecodable documents.
    pub async fn user(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.documents
            .get(USERS_COLLECTION, uid)
            .await?
            .map(|document| document.decode())
            .transpose()
    }

    /// Write a user profile.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn put_user(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        let fields = encode(profile)?;
        self.documents.set(USERS_COLLECTION, uid, fields).await
    }
}

/// Decode one registrant document found in `list`.
///
/// # Errors
///
/// Returns `DocumentError::Serialization` if the fields do not form a
/// registrant.
pub fn decode_record(list: ListKind, document: &Document) -> Result<Record> {
    let registrant: Registrant = document.decode()?;
    Ok(Record {
        reference: RecordRef::new(list, document.id.clone()),
        registrant,
    })
}

/// Decode a snapshot of `list`.
///
/// # Errors
///
/// Fails on the first undecodable document.
pub fn decode_records(list: ListKind, documents: &[Document]) -> Result<Vec<Record>> {
    documents
        .iter()
        .map(|document| decode_record(list, document))
        .collect()
}

impl std::fmt::Debug for RosterRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterRepository").finish_non_exhaustive()
    }
}
