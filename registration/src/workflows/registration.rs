//! Registration workflow.
//!
//! A submission goes through four steps, each a separate effect:
//!
//! ```text
//! Submit ──▶ closed? / invalid? ──▶ Rejected
//!    │
//!    ▼
//! duplicate check (both lists) ──▶ Rejected
//!    │
//!    ▼
//! occupancy check ──▶ insert into applications ──▶ Accepted
//!                 └─▶ insert into waitingList ──▶ position ──▶ Waitlisted
//! ```
//!
//! The checks are reads issued immediately before the write, not a
//! transaction: two concurrent submissions can both pass the capacity or the
//! duplicate check. Each submission performs exactly one store mutation.

use super::WorkflowEnvironment;
use crate::error::RosterError;
use crate::repository::RosterRepository;
use crate::secret::SecretHash;
use crate::types::{ListKind, RecordId, Registrant, RegistrationForm, RequestId, Settings};
use crate::validation::{ValidationError, validate_submission};
use chrono::{DateTime, Utc};
use roster_core::document::{DocumentError, Result as DocumentResult};
use roster_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use roster_runtime::metrics::WorkflowMetrics;
use std::collections::HashMap;

/// Why a submission was turned away before anything was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Registration is closed
    Closed,
    /// A required field is blank
    Invalid(&'static str),
    /// Student id already in `applications`
    AlreadyRegistered,
    /// Student id already in `waitingList`
    AlreadyWaitlisted,
}

impl Rejection {
    const fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Invalid(_) => "invalid",
            Self::AlreadyRegistered => "already_registered",
            Self::AlreadyWaitlisted => "already_waitlisted",
        }
    }
}

impl From<Rejection> for RosterError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Closed => Self::RegistrationClosed,
            Rejection::Invalid(message) => Self::Invalid(message.to_string()),
            Rejection::AlreadyRegistered => Self::AlreadyRegistered,
            Rejection::AlreadyWaitlisted => Self::AlreadyWaitlisted,
        }
    }
}

/// Actions of the registration workflow.
#[derive(Clone, Debug)]
pub enum RegistrationAction {
    // ========== Command ==========
    /// Submit a candidate registration against a settings snapshot
    Submit {
        /// Correlation id
        request_id: RequestId,
        /// The candidate
        form: RegistrationForm,
        /// Settings read just before submitting
        settings: Settings,
    },

    // ========== Effect results ==========
    /// Both lists were searched for the student id
    DuplicateChecked {
        /// Correlation id
        request_id: RequestId,
        /// The list already holding the student id, if any
        existing: Option<ListKind>,
    },
    /// The registration list was counted
    OccupancyChecked {
        /// Correlation id
        request_id: RequestId,
        /// Current number of registrations
        registered: usize,
    },
    /// The record was added to the waitlist; its position is still unknown
    WaitlistInserted {
        /// Correlation id
        request_id: RequestId,
        /// New waitlist record
        id: RecordId,
    },

    // ========== Terminal ==========
    /// Stored in `applications`
    Accepted {
        /// Correlation id
        request_id: RequestId,
        /// New record
        id: RecordId,
    },
    /// Stored in `waitingList`
    Waitlisted {
        /// Correlation id
        request_id: RequestId,
        /// New record
        id: RecordId,
        /// 1-based position in the waitlist
        position: usize,
    },
    /// Turned away without a write
    Rejected {
        /// Correlation id
        request_id: RequestId,
        /// Reason
        rejection: Rejection,
    },
    /// A store read or write failed
    Failed {
        /// Correlation id
        request_id: RequestId,
        /// Underlying error
        error: DocumentError,
    },
}

impl RegistrationAction {
    /// Correlation id carried by every action.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Submit { request_id, .. }
            | Self::DuplicateChecked { request_id, .. }
            | Self::OccupancyChecked { request_id, .. }
            | Self::WaitlistInserted { request_id, .. }
            | Self::Accepted { request_id, .. }
            | Self::Waitlisted { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Whether this action ends the request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Accepted { .. }
                | Self::Waitlisted { .. }
                | Self::Rejected { .. }
                | Self::Failed { .. }
        )
    }
}

/// A submission between its command and its terminal action.
#[derive(Clone, Debug)]
pub struct PendingSubmission {
    /// The validated form
    pub form: RegistrationForm,
    /// Capacity from the settings snapshot
    pub capacity: u32,
    /// When the command arrived
    pub started_at: DateTime<Utc>,
}

/// Registration workflow state.
#[derive(Clone, Debug, Default)]
pub struct RegistrationState {
    /// Submissions in flight
    pub pending: HashMap<RequestId, PendingSubmission>,
    /// Submissions stored in `applications`
    pub accepted: u64,
    /// Submissions stored in `waitingList`
    pub waitlisted: u64,
    /// Submissions turned away
    pub rejected: u64,
    /// Submissions that hit a store failure
    pub failed: u64,
}

/// Reducer for the registration workflow.
#[derive(Clone, Debug, Default)]
pub struct RegistrationReducer;

impl RegistrationReducer {
    /// Creates a new `RegistrationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(request_id: RequestId, rejection: Rejection) -> Effect<RegistrationAction> {
        async_effect! {
            Some(RegistrationAction::Rejected { request_id, rejection })
        }
    }

    fn finish(state: &mut RegistrationState, action: &RegistrationAction, env: &WorkflowEnvironment) {
        let request_id = action.request_id();
        let outcome = match action {
            RegistrationAction::Accepted { id, .. } => {
                state.accepted += 1;
                tracing::info!(%request_id, %id, "Registration accepted");
                "accepted"
            },
            RegistrationAction::Waitlisted { id, position, .. } => {
                state.waitlisted += 1;
                tracing::info!(%request_id, %id, position, "Registration waitlisted");
                "waitlisted"
            },
            RegistrationAction::Rejected { rejection, .. } => {
                state.rejected += 1;
                tracing::info!(%request_id, reason = rejection.label(), "Registration rejected");
                rejection.label()
            },
            RegistrationAction::Failed { error, .. } => {
                state.failed += 1;
                tracing::error!(%request_id, error = %error, "Registration failed");
                "failed"
            },
            _ => return,
        };

        WorkflowMetrics::record_submission(outcome);
        if let Some(pending) = state.pending.remove(&request_id) {
            let elapsed = (env.clock.now() - pending.started_at)
                .to_std()
                .unwrap_or_default();
            WorkflowMetrics::record_duration("registration", elapsed);
        }
    }
}

impl Reducer for RegistrationReducer {
    type State = RegistrationState;
    type Action = RegistrationAction;
    type Environment = WorkflowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RegistrationAction::Submit {
                request_id,
                form,
                settings,
            } => {
                if settings.is_closed {
                    return smallvec![Self::reject(request_id, Rejection::Closed)];
                }
                if let Err(ValidationError(message)) = validate_submission(&form) {
                    return smallvec![Self::reject(request_id, Rejection::Invalid(message))];
                }

                let student_id = form.student_id.trim().to_owned();
                tracing::debug!(%request_id, %student_id, "Checking for duplicates");
                state.pending.insert(
                    request_id,
                    PendingSubmission {
                        form,
                        capacity: settings.max_capacity,
                        started_at: env.clock.now(),
                    },
                );

                let records = env.records.clone();
                smallvec![async_effect! {
                    match find_existing(&records, &student_id).await {
                        Ok(existing) => Some(RegistrationAction::DuplicateChecked { request_id, existing }),
                        Err(error) => Some(RegistrationAction::Failed { request_id, error }),
                    }
                }]
            },

            RegistrationAction::DuplicateChecked {
                request_id,
                existing,
            } => {
                if !state.pending.contains_key(&request_id) {
                    return SmallVec::new();
                }

                match existing {
                    Some(ListKind::Registrations) => {
                        smallvec![Self::reject(request_id, Rejection::AlreadyRegistered)]
                    },
                    Some(ListKind::Waitlist) => {
                        smallvec![Self::reject(request_id, Rejection::AlreadyWaitlisted)]
                    },
                    None => {
                        let records = env.records.clone();
                        smallvec![async_effect! {
                            match records.count(ListKind::Registrations).await {
                                Ok(registered) => Some(RegistrationAction::OccupancyChecked { request_id, registered }),
                                Err(error) => Some(RegistrationAction::Failed { request_id, error }),
                            }
                        }]
                    },
                }
            },

            RegistrationAction::OccupancyChecked {
                request_id,
                registered,
            } => {
                let Some(pending) = state.pending.get(&request_id) else {
                    return SmallVec::new();
                };

                let list = if registered < pending.capacity as usize {
                    ListKind::Registrations
                } else {
                    ListKind::Waitlist
                };
                tracing::debug!(%request_id, registered, capacity = pending.capacity, %list, "Occupancy checked");

                let form = pending.form.clone();
                let records = env.records.clone();
                let clock = env.clock.clone();
                smallvec![async_effect! {
                    let registrant = new_registrant(&form, clock.now_millis());
                    match records.insert(list, &registrant).await {
                        Ok(id) if list == ListKind::Registrations => {
                            Some(RegistrationAction::Accepted { request_id, id })
                        },
                        Ok(id) => Some(RegistrationAction::WaitlistInserted { request_id, id }),
                        Err(error) => Some(RegistrationAction::Failed { request_id, error }),
                    }
                }]
            },

            RegistrationAction::WaitlistInserted { request_id, id } => {
                let records = env.records.clone();
                smallvec![async_effect! {
                    match records.waitlist_position(&id).await {
                        Ok(Some(position)) => Some(RegistrationAction::Waitlisted { request_id, id, position }),
                        Ok(None) => Some(RegistrationAction::Failed {
                            request_id,
                            error: DocumentError::NotFound {
                                collection: ListKind::Waitlist.collection().to_string(),
                                id: id.to_string(),
                            },
                        }),
                        Err(error) => Some(RegistrationAction::Failed { request_id, error }),
                    }
                }]
            },

            terminal @ (RegistrationAction::Accepted { .. }
            | RegistrationAction::Waitlisted { .. }
            | RegistrationAction::Rejected { .. }
            | RegistrationAction::Failed { .. }) => {
                Self::finish(state, &terminal, env);
                SmallVec::new()
            },
        }
    }
}

/// The list already holding `student_id`, registrations first.
async fn find_existing(
    records: &RosterRepository,
    student_id: &str,
) -> DocumentResult<Option<ListKind>> {
    for list in ListKind::ALL {
        if records.find_by_student_id(list, student_id).await?.is_some() {
            return Ok(Some(list));
        }
    }
    Ok(None)
}

/// Identity fields are stored trimmed, matching how lookup searches them.
fn new_registrant(form: &RegistrationForm, timestamp: i64) -> Registrant {
    Registrant {
        name: form.name.trim().to_owned(),
        student_id: form.student_id.trim().to_owned(),
        phone: form.phone.trim().to_owned(),
        affiliation: form.affiliation,
        residence: form.residence,
        residence_phone: form.residence_phone.clone(),
        secret: SecretHash::new(&form.password),
        event_id: form.event_id.clone(),
        timestamp,
        moved_from_waiting: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::{Affiliation, Residence};
    use crate::validation::MISSING_RESIDENCE_PHONE;
    use roster_core::environment::Clock;
    use roster_testing::{InMemoryDocumentStore, ReducerTest, assertions, test_clock};
    use std::sync::Arc;

    fn env() -> (WorkflowEnvironment, InMemoryDocumentStore) {
        let documents = InMemoryDocumentStore::new();
        let env = WorkflowEnvironment::new(Arc::new(documents.clone()), Arc::new(test_clock()));
        (env, documents)
    }

    fn form(name: &str, student_id: &str) -> RegistrationForm {
        RegistrationForm {
            name: name.to_string(),
            student_id: student_id.to_string(),
            phone: "010-0000-0000".to_string(),
            affiliation: Some(Affiliation::EwhaForeignLanguageHigh),
            residence: Residence::NotApplicable,
            residence_phone: String::new(),
            password: "1234".to_string(),
            event_id: "1".to_string(),
        }
    }

    fn pending(capacity: u32) -> (RegistrationState, RequestId) {
        let request_id = RequestId::new();
        let mut state = RegistrationState::default();
        state.pending.insert(
            request_id,
            PendingSubmission {
                form: form("김이화", "20250001"),
                capacity,
                started_at: test_clock().now(),
            },
        );
        (state, request_id)
    }

    #[test]
    fn test_closed_submission_is_rejected_without_pending_entry() {
        let (env, _) = env();
        ReducerTest::new(RegistrationReducer::new())
            .with_env(env)
            .given_state(RegistrationState::default())
            .when_action(RegistrationAction::Submit {
                request_id: RequestId::new(),
                form: form("김이화", "20250001"),
                settings: Settings {
                    is_closed: true,
                    ..Settings::default()
                },
            })
            .then_state(|state| assert!(state.pending.is_empty()))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[tokio::test]
    async fn test_closed_rejection_resolves() {
        let (env, documents) = env();
        let mut state = RegistrationState::default();
        let request_id = RequestId::new();
        let effects = RegistrationReducer.reduce(
            &mut state,
            RegistrationAction::Submit {
                request_id,
                form: form("김이화", "20250001"),
                settings: Settings {
                    is_closed: true,
                    ..Settings::default()
                },
            },
            &env,
        );

        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            RegistrationAction::Rejected { rejection: Rejection::Closed, .. }
        ));
        assert!(documents.is_empty("applications"));
    }

    #[tokio::test]
    async fn test_missing_residence_phone_is_invalid() {
        let (env, _) = env();
        let mut state = RegistrationState::default();
        let effects = RegistrationReducer.reduce(
            &mut state,
            RegistrationAction::Submit {
                request_id: RequestId::new(),
                form: RegistrationForm {
                    residence: Residence::Dormitory,
                    ..form("김이화", "20250001")
                },
                settings: Settings::default(),
            },
            &env,
        );

        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            RegistrationAction::Rejected { rejection: Rejection::Invalid(MISSING_RESIDENCE_PHONE), .. }
        ));
    }

    #[test]
    fn test_valid_submission_tracks_pending() {
        let (env, _) = env();
        let request_id = RequestId::new();
        ReducerTest::new(RegistrationReducer::new())
            .with_env(env)
            .given_state(RegistrationState::default())
            .when_action(RegistrationAction::Submit {
                request_id,
                form: form("김이화", "20250001"),
                settings: Settings::default(),
            })
            .then_state(move |state| {
                let pending = state.pending.get(&request_id).unwrap();
                assert_eq!(pending.capacity, 50);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[tokio::test]
    async fn test_occupancy_below_capacity_inserts_registration() {
        let (env, documents) = env();
        let (mut state, request_id) = pending(2);

        let effects = RegistrationReducer.reduce(
            &mut state,
            RegistrationAction::OccupancyChecked { request_id, registered: 1 },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();

        assert!(matches!(action, RegistrationAction::Accepted { .. }));
        assert_eq!(documents.len("applications"), 1);
        assert!(documents.is_empty("waitingList"));
    }

    #[tokio::test]
    async fn test_occupancy_at_capacity_inserts_waitlist() {
        let (env, documents) = env();
        let (mut state, request_id) = pending(2);

        let effects = RegistrationReducer.reduce(
            &mut state,
            RegistrationAction::OccupancyChecked { request_id, registered: 2 },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();

        assert!(matches!(action, RegistrationAction::WaitlistInserted { .. }));
        assert_eq!(documents.len("waitingList"), 1);
        assert!(documents.is_empty("applications"));
    }

    #[tokio::test]
    async fn test_stored_secret_is_hashed() {
        let (env, documents) = env();
        let (mut state, request_id) = pending(5);

        let effects = RegistrationReducer.reduce(
            &mut state,
            RegistrationAction::OccupancyChecked { request_id, registered: 0 },
            &env,
        );
        assertions::resolve_first_future(effects).await.unwrap();

        let stored = documents.documents("applications");
        let registrant: Registrant = stored[0].decode().unwrap();
        assert!(registrant.secret.is_hashed());
        assert!(registrant.secret.verify("1234"));
        assert_eq!(registrant.timestamp, test_clock().now().timestamp_millis());
    }

    #[test]
    fn test_registrant_identity_is_stored_trimmed() {
        let mut padded = form(" 김이화 ", "20250001  ");
        padded.phone = "\t010-0000-0000 ".to_string();

        let registrant = new_registrant(&padded, 1);

        assert_eq!(registrant.name, "김이화");
        assert_eq!(registrant.student_id, "20250001");
        assert_eq!(registrant.phone, "010-0000-0000");
    }

    #[test]
    fn test_duplicate_in_waitlist_rejects() {
        let (env, _) = env();
        let (state, request_id) = pending(2);

        ReducerTest::new(RegistrationReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(RegistrationAction::DuplicateChecked {
                request_id,
                existing: Some(ListKind::Waitlist),
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_terminal_action_clears_pending() {
        let (env, _) = env();
        let (state, request_id) = pending(2);

        ReducerTest::new(RegistrationReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(RegistrationAction::Waitlisted {
                request_id,
                id: RecordId::new("w1"),
                position: 1,
            })
            .then_state(|state| {
                assert!(state.pending.is_empty());
                assert_eq!(state.waitlisted, 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_unknown_request_is_ignored() {
        let (env, _) = env();
        ReducerTest::new(RegistrationReducer::new())
            .with_env(env)
            .given_state(RegistrationState::default())
            .when_action(RegistrationAction::OccupancyChecked {
                request_id: RequestId::new(),
                registered: 0,
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
