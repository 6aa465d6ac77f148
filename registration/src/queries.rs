//! Read-only views: self-service lookup, admin listing and dashboard,
//! notices and the event catalogue.

use crate::error::RosterError;
use crate::repository::RosterRepository;
use crate::types::{
    Affiliation, EventInfo, ListKind, Notice, Record, Registrant, RegistrantView, Residence,
    Settings,
};
use crate::validation::validate_lookup;
use serde::{Deserialize, Serialize};

/// Events shown before any are stored.
#[must_use]
pub fn sample_events() -> Vec<EventInfo> {
    vec![EventInfo {
        id: "1".to_string(),
        title: "7th 이화의밤".to_string(),
        description: String::new(),
        date: "2025-07-19".to_string(),
        location: String::new(),
    }]
}

/// Listing filter as sent by the admin page.
///
/// `school` and `dorm` take `all` or a stored label. The residence filter
/// only applies while `school` is `이화여고`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RosterParams {
    /// `all` or an affiliation label
    #[serde(default)]
    pub school: Option<String>,
    /// `all` or a residence label
    #[serde(default)]
    pub dorm: Option<String>,
    /// Name substring
    #[serde(default)]
    pub name: Option<String>,
}

/// Parsed listing filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterFilter {
    /// Only this affiliation, or all
    pub affiliation: Option<Affiliation>,
    /// Only this residence, honoured for 이화여고 only
    pub residence: Option<Residence>,
    /// Name must contain this
    pub name: String,
}

impl RosterFilter {
    /// Whether `registrant` passes every active filter.
    #[must_use]
    pub fn matches(&self, registrant: &Registrant) -> bool {
        if let Some(affiliation) = self.affiliation {
            if registrant.affiliation != Some(affiliation) {
                return false;
            }
            if affiliation.has_residence()
                && self
                    .residence
                    .is_some_and(|residence| registrant.residence != residence)
            {
                return false;
            }
        }
        self.name.is_empty() || registrant.name.contains(&self.name)
    }
}

impl TryFrom<RosterParams> for RosterFilter {
    type Error = RosterError;

    fn try_from(params: RosterParams) -> Result<Self, Self::Error> {
        fn selected(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty() && *v != "all")
        }

        let affiliation = selected(params.school.as_deref())
            .map(|label| {
                Affiliation::ALL
                    .into_iter()
                    .find(|a| a.as_str() == label)
                    .ok_or_else(|| RosterError::Invalid(format!("알 수 없는 학교 구분입니다: {label}")))
            })
            .transpose()?;
        let residence = selected(params.dorm.as_deref())
            .map(|label| {
                Residence::ALL
                    .into_iter()
                    .find(|r| r.as_str() == label)
                    .ok_or_else(|| RosterError::Invalid(format!("알 수 없는 기숙사/야자 구분입니다: {label}")))
            })
            .transpose()?;

        Ok(Self {
            affiliation,
            residence,
            name: params.name.unwrap_or_default().trim().to_string(),
        })
    }
}

/// Both lists after filtering.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterListing {
    /// Matching registrations, oldest first
    pub registrations: Vec<RegistrantView>,
    /// Matching waitlist entries, oldest first, with their waiting number
    pub waitlist: Vec<RegistrantView>,
}

impl RosterListing {
    /// The view for one list.
    #[must_use]
    pub fn list(&self, list: ListKind) -> &[RegistrantView] {
        match list {
            ListKind::Registrations => &self.registrations,
            ListKind::Waitlist => &self.waitlist,
        }
    }
}

/// Registrations and waitlist entries of one affiliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliationCount {
    /// Affiliation label
    pub affiliation: Affiliation,
    /// In `applications`
    pub registered: usize,
    /// In `waitingList`
    pub waitlisted: usize,
}

/// Admin summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Number of registrations
    pub registered: usize,
    /// Number of waitlist entries
    pub waitlisted: usize,
    /// Configured capacity
    pub capacity: u32,
    /// Free slots, never negative
    pub remaining: usize,
    /// Registrations have reached capacity
    pub is_full: bool,
    /// Submissions are rejected
    pub is_closed: bool,
    /// Counts per affiliation; records without one count as 기타
    pub by_affiliation: Vec<AffiliationCount>,
}

impl Dashboard {
    /// Summarize both lists against `settings`.
    #[must_use]
    pub fn summarize(registrations: &[Record], waitlist: &[Record], settings: Settings) -> Self {
        let count = |records: &[Record], affiliation: Affiliation| {
            records
                .iter()
                .filter(|r| r.registrant.affiliation.unwrap_or(Affiliation::Other) == affiliation)
                .count()
        };
        let capacity = usize::try_from(settings.max_capacity).unwrap_or(usize::MAX);

        Self {
            registered: registrations.len(),
            waitlisted: waitlist.len(),
            capacity: settings.max_capacity,
            remaining: capacity.saturating_sub(registrations.len()),
            is_full: registrations.len() >= capacity,
            is_closed: settings.is_closed,
            by_affiliation: Affiliation::ALL
                .into_iter()
                .map(|affiliation| AffiliationCount {
                    affiliation,
                    registered: count(registrations, affiliation),
                    waitlisted: count(waitlist, affiliation),
                })
                .collect(),
        }
    }
}

/// Read-side operations over the roster collections.
#[derive(Clone, Debug)]
pub struct RosterQueries {
    records: RosterRepository,
}

impl RosterQueries {
    /// Queries over `records`.
    #[must_use]
    pub const fn new(records: RosterRepository) -> Self {
        Self { records }
    }

    /// Find a record by exact name and student id, registrations first.
    ///
    /// Waitlist hits carry their waiting number.
    ///
    /// # Errors
    ///
    /// `Invalid` when either key is blank, `RecordNotFound` when nothing
    /// matches, storage failures.
    #[tracing::instrument(skip(self, name))]
    pub async fn lookup(&self, name: &str, student_id: &str) -> Result<RegistrantView, RosterError> {
        validate_lookup(name, student_id)?;
        let (name, student_id) = (name.trim(), student_id.trim());

        if let Some(record) = self
            .records
            .find_by_identity(ListKind::Registrations, name, student_id)
            .await?
        {
            return Ok(record.view());
        }

        let Some(record) = self
            .records
            .find_by_identity(ListKind::Waitlist, name, student_id)
            .await?
        else {
            return Err(RosterError::RecordNotFound(None));
        };

        let mut view = record.view();
        view.waiting_number = self.records.waitlist_position(&record.reference.id).await?;
        Ok(view)
    }

    /// Both lists, filtered.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn roster(&self, filter: &RosterFilter) -> Result<RosterListing, RosterError> {
        let (registrations, waitlist) = tokio::try_join!(
            self.records.list(ListKind::Registrations),
            self.records.list(ListKind::Waitlist),
        )?;
        Ok(listing(&registrations, &waitlist, filter))
    }

    /// Counts against `settings`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn dashboard(&self, settings: Settings) -> Result<Dashboard, RosterError> {
        let (registrations, waitlist) = tokio::try_join!(
            self.records.list(ListKind::Registrations),
            self.records.list(ListKind::Waitlist),
        )?;
        Ok(Dashboard::summarize(&registrations, &waitlist, settings))
    }

    /// Notices, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn notices(&self) -> Result<Vec<Notice>, RosterError> {
        Ok(self.records.notices().await?)
    }

    /// The event catalogue.
    #[must_use]
    pub fn events(&self) -> Vec<EventInfo> {
        sample_events()
    }

    /// Event details, from the `events` collection or the catalogue.
    ///
    /// # Errors
    ///
    /// `EventNotFound` for an unknown id, storage failures.
    pub async fn event(&self, id: &str) -> Result<EventInfo, RosterError> {
        if let Some(event) = self.records.event(id).await? {
            return Ok(event);
        }
        sample_events()
            .into_iter()
            .find(|event| event.id == id)
            .ok_or_else(|| RosterError::EventNotFound(id.to_string()))
    }
}

/// Filter both lists. Waiting numbers are positions in the unfiltered
/// waitlist.
#[must_use]
pub fn listing(registrations: &[Record], waitlist: &[Record], filter: &RosterFilter) -> RosterListing {
    RosterListing {
        registrations: registrations
            .iter()
            .filter(|record| filter.matches(&record.registrant))
            .map(Record::view)
            .collect(),
        waitlist: waitlist
            .iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(&record.registrant))
            .map(|(index, record)| RegistrantView {
                waiting_number: Some(index + 1),
                ..record.view()
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::secret::SecretHash;
    use crate::types::RecordRef;
    use roster_testing::InMemoryDocumentStore;
    use std::sync::Arc;

    fn registrant(name: &str, student_id: &str, affiliation: Affiliation, timestamp: i64) -> Registrant {
        Registrant {
            name: name.to_string(),
            student_id: student_id.to_string(),
            phone: "010-1234-5678".to_string(),
            affiliation: Some(affiliation),
            residence: if affiliation.has_residence() {
                Residence::Dormitory
            } else {
                Residence::NotApplicable
            },
            residence_phone: String::new(),
            secret: SecretHash::new("pw"),
            event_id: "1".to_string(),
            timestamp,
            moved_from_waiting: false,
        }
    }

    fn record(list: ListKind, id: &str, registrant: Registrant) -> Record {
        Record {
            reference: RecordRef::new(list, id),
            registrant,
        }
    }

    fn queries() -> (RosterQueries, RosterRepository) {
        let records = RosterRepository::new(Arc::new(InMemoryDocumentStore::new()));
        (RosterQueries::new(records.clone()), records)
    }

    #[test]
    fn test_filter_parses_labels() {
        let filter = RosterFilter::try_from(RosterParams {
            school: Some("이화여고".to_string()),
            dorm: Some("야자".to_string()),
            name: Some(" 김 ".to_string()),
        })
        .unwrap();
        assert_eq!(filter.affiliation, Some(Affiliation::EwhaGirlsHigh));
        assert_eq!(filter.residence, Some(Residence::EveningStudy));
        assert_eq!(filter.name, "김");

        let all = RosterFilter::try_from(RosterParams {
            school: Some("all".to_string()),
            dorm: Some("all".to_string()),
            name: None,
        })
        .unwrap();
        assert_eq!(all, RosterFilter::default());

        assert!(RosterFilter::try_from(RosterParams {
            school: Some("서울고".to_string()),
            ..RosterParams::default()
        })
        .is_err());
    }

    #[test]
    fn test_residence_filter_only_for_girls_high() {
        let graduate = registrant("박졸업", "1", Affiliation::Graduate, 1);
        let filter = RosterFilter {
            affiliation: Some(Affiliation::Graduate),
            residence: Some(Residence::Dormitory),
            name: String::new(),
        };
        assert!(filter.matches(&graduate));

        let student = registrant("김재학", "2", Affiliation::EwhaGirlsHigh, 2);
        let filter = RosterFilter {
            affiliation: Some(Affiliation::EwhaGirlsHigh),
            residence: Some(Residence::EveningStudy),
            name: String::new(),
        };
        assert!(!filter.matches(&student));
    }

    #[test]
    fn test_listing_keeps_unfiltered_waiting_numbers() {
        let waitlist = vec![
            record(ListKind::Waitlist, "w1", registrant("김하나", "1", Affiliation::Other, 1)),
            record(ListKind::Waitlist, "w2", registrant("이둘", "2", Affiliation::Other, 2)),
        ];
        let filter = RosterFilter {
            name: "이".to_string(),
            ..RosterFilter::default()
        };

        let listing = listing(&[], &waitlist, &filter);
        assert_eq!(listing.waitlist.len(), 1);
        assert_eq!(listing.waitlist[0].waiting_number, Some(2));
    }

    #[test]
    fn test_dashboard_counts() {
        let registrations = vec![
            record(ListKind::Registrations, "a", registrant("가", "1", Affiliation::EwhaGirlsHigh, 1)),
            record(ListKind::Registrations, "b", registrant("나", "2", Affiliation::Graduate, 2)),
        ];
        let mut untagged = registrant("다", "3", Affiliation::Other, 3);
        untagged.affiliation = None;
        let waitlist = vec![record(ListKind::Waitlist, "c", untagged)];

        let settings = Settings {
            max_capacity: 2,
            is_closed: true,
            timestamp: 0,
        };
        let dashboard = Dashboard::summarize(&registrations, &waitlist, settings);

        assert_eq!(dashboard.registered, 2);
        assert_eq!(dashboard.waitlisted, 1);
        assert_eq!(dashboard.remaining, 0);
        assert!(dashboard.is_full);
        assert!(dashboard.is_closed);
        let other = dashboard
            .by_affiliation
            .iter()
            .find(|c| c.affiliation == Affiliation::Other)
            .unwrap();
        assert_eq!(other.waitlisted, 1);
    }

    #[test]
    fn test_remaining_never_negative() {
        let registrations = vec![
            record(ListKind::Registrations, "a", registrant("가", "1", Affiliation::Other, 1)),
            record(ListKind::Registrations, "b", registrant("나", "2", Affiliation::Other, 2)),
        ];
        let settings = Settings {
            max_capacity: 1,
            ..Settings::default()
        };
        assert_eq!(Dashboard::summarize(&registrations, &[], settings).remaining, 0);
    }

    #[tokio::test]
    async fn test_lookup_prefers_registrations_then_waitlist() {
        let (queries, records) = queries();
        records
            .insert(ListKind::Waitlist, &registrant("최대기", "9", Affiliation::Other, 1))
            .await
            .unwrap();
        records
            .insert(ListKind::Waitlist, &registrant("김이화", "7", Affiliation::Other, 2))
            .await
            .unwrap();

        let view = queries.lookup("김이화", "7").await.unwrap();
        assert_eq!(view.list, ListKind::Waitlist);
        assert_eq!(view.waiting_number, Some(2));

        records
            .insert(ListKind::Registrations, &registrant("김이화", "7", Affiliation::Other, 3))
            .await
            .unwrap();
        let view = queries.lookup("김이화", "7").await.unwrap();
        assert_eq!(view.list, ListKind::Registrations);
        assert_eq!(view.waiting_number, None);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let (queries, _) = queries();
        assert!(matches!(
            queries.lookup("", "7").await,
            Err(RosterError::Invalid(_))
        ));
        assert!(matches!(
            queries.lookup("김이화", "7").await,
            Err(RosterError::RecordNotFound(None))
        ));
    }

    #[tokio::test]
    async fn test_event_falls_back_to_catalogue() {
        let (queries, records) = queries();
        assert_eq!(queries.event("1").await.unwrap().title, "7th 이화의밤");
        assert!(matches!(
            queries.event("2").await,
            Err(RosterError::EventNotFound(_))
        ));

        records
            .put_event(&EventInfo {
                id: "1".to_string(),
                title: "이화의밤".to_string(),
                description: "강당".to_string(),
                date: "2025-07-19".to_string(),
                location: "대강당".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(queries.event("1").await.unwrap().location, "대강당");
    }
}
