//! Live roster view for the admin page.
//!
//! [`RosterFeed`] subscribes to both lists and the settings singleton and
//! emits a complete [`RosterSnapshot`] once all three have reported, then
//! again after every change to any of them.

use crate::queries::{Dashboard, RosterFilter, listing};
use crate::repository::{RosterRepository, decode_records};
use crate::types::{ListKind, RegistrantView, SETTINGS_DOCUMENT, Settings};
use futures::{Stream, StreamExt};
use roster_core::document::{Document, Result};
use serde::Serialize;
use std::pin::Pin;

/// Everything the admin page shows.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    /// Registrations, oldest first
    pub registrations: Vec<RegistrantView>,
    /// Waitlist, oldest first, with waiting numbers
    pub waitlist: Vec<RegistrantView>,
    /// Settings singleton, `None` until it is first created
    pub settings: Option<Settings>,
    /// Counts against the current settings
    pub dashboard: Dashboard,
}

/// Stream of roster snapshots.
pub type RosterStream = Pin<Box<dyn Stream<Item = Result<RosterSnapshot>> + Send>>;

/// Combines the roster subscriptions.
#[derive(Clone, Debug)]
pub struct RosterFeed {
    records: RosterRepository,
}

impl RosterFeed {
    /// Feed over `records`.
    #[must_use]
    pub const fn new(records: RosterRepository) -> Self {
        Self { records }
    }

    /// Subscribe to the combined view. Dropping the stream unsubscribes
    /// from all three sources.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Subscription` if any source cannot start.
    pub async fn subscribe(&self) -> Result<RosterStream> {
        let mut registrations = self.records.subscribe_list(ListKind::Registrations).await?;
        let mut waitlist = self.records.subscribe_list(ListKind::Waitlist).await?;
        let mut settings = self.records.subscribe_settings().await?;
        tracing::debug!("Roster feed subscribed");

        let stream = async_stream::stream! {
            let mut latest_registrations: Option<Vec<Document>> = None;
            let mut latest_waitlist: Option<Vec<Document>> = None;
            let mut latest_settings: Option<Vec<Document>> = None;

            loop {
                let update: Result<()> = tokio::select! {
                    Some(snapshot) = registrations.next() => {
                        snapshot.map(|documents| latest_registrations = Some(documents))
                    },
                    Some(snapshot) = waitlist.next() => {
                        snapshot.map(|documents| latest_waitlist = Some(documents))
                    },
                    Some(snapshot) = settings.next() => {
                        snapshot.map(|documents| latest_settings = Some(documents))
                    },
                    else => break,
                };

                if let Err(error) = update {
                    tracing::warn!(error = %error, "Roster feed source failed");
                    yield Err(error);
                    break;
                }

                if let (Some(r), Some(w), Some(s)) =
                    (&latest_registrations, &latest_waitlist, &latest_settings)
                {
                    yield combine(r, w, s);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Build a snapshot from raw collection snapshots.
///
/// # Errors
///
/// Returns `DocumentError::Serialization` for an undecodable document.
pub fn combine(
    registrations: &[Document],
    waitlist: &[Document],
    settings: &[Document],
) -> Result<RosterSnapshot> {
    let registrations = decode_records(ListKind::Registrations, registrations)?;
    let waitlist = decode_records(ListKind::Waitlist, waitlist)?;
    let settings = settings
        .iter()
        .find(|document| document.id == SETTINGS_DOCUMENT)
        .map(Document::decode::<Settings>)
        .transpose()?;

    let dashboard = Dashboard::summarize(&registrations, &waitlist, settings.unwrap_or_default());
    let views = listing(&registrations, &waitlist, &RosterFilter::default());

    Ok(RosterSnapshot {
        registrations: views.registrations,
        waitlist: views.waitlist,
        settings,
        dashboard,
    })
}
