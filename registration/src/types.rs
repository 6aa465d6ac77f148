//! Domain types for the registration service.
//!
//! Records are stored as JSON documents whose keys match the web client
//! (`studentId`, `schoolType`, `dormitoryStatus`, ...), so every type here
//! carries explicit serde names.

use crate::secret::SecretHash;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Collections
// ============================================================================

/// Collection holding the settings singleton.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Document id of the settings singleton.
pub const SETTINGS_DOCUMENT: &str = "appSettings";

/// Collection of event details.
pub const EVENTS_COLLECTION: &str = "events";

/// Collection of notices.
pub const NOTICES_COLLECTION: &str = "notices";

/// Collection of user profiles (admin flag).
pub const USERS_COLLECTION: &str = "users";

/// Capacity used when the settings document is created.
pub const DEFAULT_CAPACITY: u32 = 50;

// ============================================================================
// Identifiers
// ============================================================================

/// Correlates a workflow command with its terminal action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned document id of a registrant record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a document id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw document id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Lists
// ============================================================================

/// The two stores a registrant record can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    /// Accepted registrants
    #[serde(rename = "applications")]
    Registrations,
    /// Overflow, ordered by submission time
    #[serde(rename = "waitingList")]
    Waitlist,
}

impl ListKind {
    /// Both lists, registrations first.
    pub const ALL: [Self; 2] = [Self::Registrations, Self::Waitlist];

    /// Collection name in the document store.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Registrations => "applications",
            Self::Waitlist => "waitingList",
        }
    }

    /// Prefix of the exported CSV file name.
    #[must_use]
    pub const fn export_prefix(self) -> &'static str {
        match self {
            Self::Registrations => "신청자_목록",
            Self::Waitlist => "대기자_목록",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Addresses one record: the list it lives in plus its document id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Which store
    pub list: ListKind,
    /// Document id within that store
    pub id: RecordId,
}

impl RecordRef {
    /// Build a reference
    #[must_use]
    pub fn new(list: ListKind, id: impl Into<RecordId>) -> Self {
        Self {
            list,
            id: id.into(),
        }
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.list, self.id)
    }
}

// ============================================================================
// Registrant
// ============================================================================

/// School affiliation of a registrant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    /// 이화여고
    #[serde(rename = "이화여고")]
    EwhaGirlsHigh,
    /// 이화외고
    #[serde(rename = "이화외고")]
    EwhaForeignLanguageHigh,
    /// 졸업생
    #[serde(rename = "졸업생")]
    Graduate,
    /// 기타
    #[serde(rename = "기타")]
    Other,
}

impl Affiliation {
    /// Every affiliation, in display order.
    pub const ALL: [Self; 4] = [
        Self::EwhaGirlsHigh,
        Self::EwhaForeignLanguageHigh,
        Self::Graduate,
        Self::Other,
    ];

    /// Label as stored in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EwhaGirlsHigh => "이화여고",
            Self::EwhaForeignLanguageHigh => "이화외고",
            Self::Graduate => "졸업생",
            Self::Other => "기타",
        }
    }

    /// Only current 이화여고 students have a dormitory or study-hall status.
    #[must_use]
    pub const fn has_residence(self) -> bool {
        matches!(self, Self::EwhaGirlsHigh)
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evening residence status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Residence {
    /// 기숙사 (dormitory)
    #[serde(rename = "기숙사")]
    Dormitory,
    /// 야자 (evening self-study)
    #[serde(rename = "야자")]
    EveningStudy,
    /// 해당없음
    #[default]
    #[serde(rename = "해당없음")]
    NotApplicable,
}

impl Residence {
    /// Every residence status, in display order.
    pub const ALL: [Self; 3] = [Self::Dormitory, Self::EveningStudy, Self::NotApplicable];

    /// Label as stored in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dormitory => "기숙사",
            Self::EveningStudy => "야자",
            Self::NotApplicable => "해당없음",
        }
    }

    /// Whether a contact number for the dormitory or study hall is required.
    #[must_use]
    pub const fn requires_phone(self) -> bool {
        matches!(self, Self::Dormitory | Self::EveningStudy)
    }
}

impl fmt::Display for Residence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored registrant, in either list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    /// Full name
    pub name: String,
    /// Student number, unique across both lists
    #[serde(rename = "studentId")]
    pub student_id: String,
    /// Contact phone
    pub phone: String,
    /// School affiliation; older documents may omit it
    #[serde(rename = "schoolType", default, deserialize_with = "blank_as_none")]
    pub affiliation: Option<Affiliation>,
    /// Residence status
    #[serde(
        rename = "dormitoryStatus",
        default,
        deserialize_with = "blank_as_default"
    )]
    pub residence: Residence,
    /// Dormitory or study-hall phone
    #[serde(rename = "dormitoryPhone", default)]
    pub residence_phone: String,
    /// Secret gating self-service edit and cancellation
    #[serde(rename = "password")]
    pub secret: SecretHash,
    /// Event the record belongs to
    #[serde(rename = "eventId", default)]
    pub event_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Set on records promoted from the waitlist
    #[serde(
        rename = "movedFromWaiting",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub moved_from_waiting: bool,
}

impl Registrant {
    /// Public view of this record. The secret is never included.
    #[must_use]
    pub fn view(&self, reference: RecordRef) -> RegistrantView {
        RegistrantView {
            id: reference.id,
            list: reference.list,
            name: self.name.clone(),
            student_id: self.student_id.clone(),
            phone: self.phone.clone(),
            affiliation: self.affiliation,
            residence: self.residence,
            residence_phone: self.residence_phone.clone(),
            event_id: self.event_id.clone(),
            timestamp: self.timestamp,
            moved_from_waiting: self.moved_from_waiting,
            waiting_number: None,
        }
    }
}

/// A registrant together with where it is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Location of the record
    pub reference: RecordRef,
    /// Stored fields
    pub registrant: Registrant,
}

impl Record {
    /// Public view of this record.
    #[must_use]
    pub fn view(&self) -> RegistrantView {
        self.registrant.view(self.reference.clone())
    }
}

/// What clients see of a registrant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrantView {
    /// Document id
    pub id: RecordId,
    /// List holding the record
    pub list: ListKind,
    /// Full name
    pub name: String,
    /// Student number
    pub student_id: String,
    /// Contact phone
    pub phone: String,
    /// School affiliation
    #[serde(rename = "schoolType")]
    pub affiliation: Option<Affiliation>,
    /// Residence status
    #[serde(rename = "dormitoryStatus")]
    pub residence: Residence,
    /// Dormitory or study-hall phone
    #[serde(rename = "dormitoryPhone")]
    pub residence_phone: String,
    /// Event the record belongs to
    pub event_id: String,
    /// Submission time, ms since epoch
    pub timestamp: i64,
    /// Set on promoted records
    pub moved_from_waiting: bool,
    /// 1-based waitlist position, for waitlist records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_number: Option<usize>,
}

/// Candidate registration as submitted by the public form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    /// Full name
    #[serde(default)]
    pub name: String,
    /// Student number
    #[serde(default)]
    pub student_id: String,
    /// Contact phone
    #[serde(default)]
    pub phone: String,
    /// School affiliation; blank when not chosen
    #[serde(rename = "schoolType", default, deserialize_with = "blank_as_none")]
    pub affiliation: Option<Affiliation>,
    /// Residence status
    #[serde(
        rename = "dormitoryStatus",
        default,
        deserialize_with = "blank_as_default"
    )]
    pub residence: Residence,
    /// Dormitory or study-hall phone
    #[serde(rename = "dormitoryPhone", default)]
    pub residence_phone: String,
    /// Plain secret chosen by the registrant
    #[serde(default)]
    pub password: String,
    /// Event being applied for
    #[serde(default)]
    pub event_id: String,
}

/// The fields a registrant may change through self-service edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amendment {
    /// Full name
    #[serde(default)]
    pub name: String,
    /// Contact phone
    #[serde(default)]
    pub phone: String,
    /// School affiliation
    #[serde(rename = "schoolType", default, deserialize_with = "blank_as_none")]
    pub affiliation: Option<Affiliation>,
    /// Residence status
    #[serde(
        rename = "dormitoryStatus",
        default,
        deserialize_with = "blank_as_default"
    )]
    pub residence: Residence,
    /// Dormitory or study-hall phone
    #[serde(rename = "dormitoryPhone", default)]
    pub residence_phone: String,
}

// ============================================================================
// Settings
// ============================================================================

/// The settings singleton (`settings/appSettings`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Registration capacity; beyond it submissions go to the waitlist
    #[serde(default = "default_capacity")]
    pub max_capacity: u32,
    /// Whether submissions are rejected; a document without it is open
    #[serde(default)]
    pub is_closed: bool,
    /// Creation time, ms since epoch
    #[serde(default)]
    pub timestamp: i64,
}

const fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

impl Settings {
    /// Defaults written when the singleton is first read.
    #[must_use]
    pub const fn initial(timestamp: i64) -> Self {
        Self {
            max_capacity: DEFAULT_CAPACITY,
            is_closed: false,
            timestamp,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::initial(0)
    }
}

// ============================================================================
// Events, notices, users
// ============================================================================

/// Event details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    /// Event id
    #[serde(default)]
    pub id: String,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Date, `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,
    /// Venue
    #[serde(default)]
    pub location: String,
}

/// A notice shown on the public pages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Title
    pub title: String,
    /// Body
    #[serde(default)]
    pub content: String,
    /// Creation time, ms since epoch
    #[serde(default)]
    pub created_at: i64,
}

/// Profile document in `users/{uid}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Sign-in email
    #[serde(default)]
    pub email: String,
    /// Whether the user may use the admin area
    #[serde(default)]
    pub is_admin: bool,
}

// ============================================================================
// Serde helpers
// ============================================================================

/// The web form sends `""` for an unselected option.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(other) => T::deserialize(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn blank_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    blank_as_none(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registrant_uses_document_keys() {
        let registrant = Registrant {
            name: "김이화".to_string(),
            student_id: "20250001".to_string(),
            phone: "010-1234-5678".to_string(),
            affiliation: Some(Affiliation::EwhaGirlsHigh),
            residence: Residence::Dormitory,
            residence_phone: "02-000-0000".to_string(),
            secret: SecretHash::from_stored("plain"),
            event_id: "1".to_string(),
            timestamp: 1_752_000_000_000,
            moved_from_waiting: false,
        };

        let value = serde_json::to_value(&registrant).unwrap();
        assert_eq!(value["studentId"], json!("20250001"));
        assert_eq!(value["schoolType"], json!("이화여고"));
        assert_eq!(value["dormitoryStatus"], json!("기숙사"));
        assert_eq!(value["dormitoryPhone"], json!("02-000-0000"));
        assert_eq!(value["eventId"], json!("1"));
        assert!(value.get("movedFromWaiting").is_none());
    }

    #[test]
    fn test_blank_options_from_form() {
        let form: RegistrationForm = serde_json::from_value(json!({
            "name": "김이화",
            "studentId": "20250001",
            "phone": "010",
            "schoolType": "",
            "dormitoryStatus": "",
            "password": "pw"
        }))
        .unwrap();

        assert_eq!(form.affiliation, None);
        assert_eq!(form.residence, Residence::NotApplicable);
        assert_eq!(form.event_id, "");
    }

    #[test]
    fn test_legacy_document_without_optional_fields() {
        let registrant: Registrant = serde_json::from_value(json!({
            "name": "박졸업",
            "studentId": "20190001",
            "phone": "010",
            "password": "1234",
            "timestamp": 5
        }))
        .unwrap();

        assert_eq!(registrant.affiliation, None);
        assert_eq!(registrant.residence, Residence::NotApplicable);
        assert!(!registrant.moved_from_waiting);
    }

    #[test]
    fn test_list_kind_names() {
        assert_eq!(
            serde_json::to_value(ListKind::Waitlist).unwrap(),
            json!("waitingList")
        );
        let list: ListKind = serde_json::from_value(json!("applications")).unwrap();
        assert_eq!(list, ListKind::Registrations);
        assert_eq!(ListKind::Waitlist.export_prefix(), "대기자_목록");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::initial(42);
        assert_eq!(settings.max_capacity, 50);
        assert!(!settings.is_closed);
        assert_eq!(
            serde_json::to_value(settings).unwrap(),
            json!({ "maxCapacity": 50, "isClosed": false, "timestamp": 42 })
        );
    }

    #[test]
    fn test_settings_missing_flags_decode_as_open_defaults() {
        let partial: Settings = serde_json::from_value(json!({ "maxCapacity": 12 })).unwrap();
        assert_eq!(partial.max_capacity, 12);
        assert!(!partial.is_closed);

        let bare: Settings = serde_json::from_value(json!({ "isClosed": true })).unwrap();
        assert_eq!(bare.max_capacity, 50);
        assert!(bare.is_closed);
        assert_eq!(bare.timestamp, 0);
    }
}
