//! Cancellation and promotion workflow.
//!
//! ```text
//! Cancel ──▶ load record ──▶ verify secret ──▶ delete ──▶ Cancelled
//!                                                 │
//!                             (registration only) ▼
//!                            waitlist head? ──▶ delete head ──▶ re-add to applications
//! ```
//!
//! Promotion is not transactional. If the registration is deleted but the
//! head cannot be moved, the request ends in `PromotionFailed` and nothing
//! is rolled back.

use super::WorkflowEnvironment;
use crate::error::RosterError;
use crate::repository::RosterRepository;
use crate::types::{ListKind, Record, RecordId, RecordRef, RequestId};
use crate::validation::{MISSING_PASSWORD, is_blank};
use roster_core::document::DocumentError;
use roster_core::environment::Clock;
use roster_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use roster_runtime::metrics::WorkflowMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Who is allowed to cancel.
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The registrant, proving it with their password
    Secret(String),
    /// A signed-in admin
    Admin,
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(..)"),
            Self::Admin => f.write_str("Admin"),
        }
    }
}

/// A waitlist entry moved into the registration list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    /// Former waitlist record
    pub from: RecordId,
    /// New registration record
    pub to: RecordId,
    /// Name of the promoted registrant
    pub name: String,
    /// Student id of the promoted registrant
    pub student_id: String,
}

/// Why a cancellation was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelRejection {
    /// No password was supplied
    MissingPassword,
    /// Nothing stored at the reference
    NotFound,
    /// Password does not match
    WrongPassword,
}

impl CancelRejection {
    /// Convert into the domain error for `target`.
    #[must_use]
    pub fn into_error(self, target: RecordRef) -> RosterError {
        match self {
            Self::MissingPassword => RosterError::Invalid(MISSING_PASSWORD.to_string()),
            Self::NotFound => RosterError::RecordNotFound(Some(target)),
            Self::WrongPassword => RosterError::WrongPassword,
        }
    }
}

/// Actions of the cancellation workflow.
#[derive(Clone, Debug)]
pub enum CancellationAction {
    /// Cancel a record
    Cancel {
        /// Correlation id
        request_id: RequestId,
        /// Record to cancel
        target: RecordRef,
        /// Who asks
        authorization: Authorization,
    },
    /// The target was read
    Loaded {
        /// Correlation id
        request_id: RequestId,
        /// The record, if it still exists
        record: Option<Record>,
    },
    /// The target was deleted
    Deleted {
        /// Correlation id
        request_id: RequestId,
    },
    /// The record is gone; `promoted` is set when a waitlist entry moved up
    Cancelled {
        /// Correlation id
        request_id: RequestId,
        /// The moved waitlist entry
        promoted: Option<Promotion>,
    },
    /// Refused before anything was deleted
    Rejected {
        /// Correlation id
        request_id: RequestId,
        /// Reason
        rejection: CancelRejection,
    },
    /// The record was deleted but the waitlist head could not be moved
    PromotionFailed {
        /// Correlation id
        request_id: RequestId,
        /// Underlying error
        error: DocumentError,
    },
    /// Loading or deleting the target failed
    Failed {
        /// Correlation id
        request_id: RequestId,
        /// Underlying error
        error: DocumentError,
    },
}

impl CancellationAction {
    /// Correlation id carried by every action.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Cancel { request_id, .. }
            | Self::Loaded { request_id, .. }
            | Self::Deleted { request_id }
            | Self::Cancelled { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::PromotionFailed { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Whether this action ends the request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. }
                | Self::Rejected { .. }
                | Self::PromotionFailed { .. }
                | Self::Failed { .. }
        )
    }
}

/// A cancellation in flight.
#[derive(Clone, Debug)]
pub struct PendingCancellation {
    /// Record to cancel
    pub target: RecordRef,
    /// Who asked
    pub authorization: Authorization,
}

/// Cancellation workflow state.
#[derive(Clone, Debug, Default)]
pub struct CancellationState {
    /// Requests in flight
    pub pending: HashMap<RequestId, PendingCancellation>,
    /// Completed cancellations
    pub cancelled: u64,
    /// Completed promotions
    pub promoted: u64,
}

/// Reducer for cancellation with promotion.
#[derive(Clone, Debug, Default)]
pub struct CancellationReducer;

impl CancellationReducer {
    /// Creates a new `CancellationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for CancellationReducer {
    type State = CancellationState;
    type Action = CancellationAction;
    type Environment = WorkflowEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per workflow step
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CancellationAction::Cancel {
                request_id,
                target,
                authorization,
            } => {
                if matches!(&authorization, Authorization::Secret(password) if is_blank(password))
                {
                    return smallvec![async_effect! {
                        Some(CancellationAction::Rejected {
                            request_id,
                            rejection: CancelRejection::MissingPassword,
                        })
                    }];
                }

                tracing::debug!(%request_id, record = %target, "Cancellation requested");
                state.pending.insert(
                    request_id,
                    PendingCancellation {
                        target: target.clone(),
                        authorization,
                    },
                );

                let records = env.records.clone();
                smallvec![async_effect! {
                    match records.get(&target).await {
                        Ok(record) => Some(CancellationAction::Loaded { request_id, record }),
                        Err(error) => Some(CancellationAction::Failed { request_id, error }),
                    }
                }]
            },

            CancellationAction::Loaded { request_id, record } => {
                let Some(pending) = state.pending.get(&request_id) else {
                    return SmallVec::new();
                };

                let rejection = match (&record, &pending.authorization) {
                    (None, _) => Some(CancelRejection::NotFound),
                    (Some(record), Authorization::Secret(password))
                        if !record.registrant.secret.verify(password) =>
                    {
                        Some(CancelRejection::WrongPassword)
                    },
                    _ => None,
                };
                if let Some(rejection) = rejection {
                    return smallvec![async_effect! {
                        Some(CancellationAction::Rejected { request_id, rejection })
                    }];
                }

                let target = pending.target.clone();
                let records = env.records.clone();
                smallvec![async_effect! {
                    match records.delete(&target).await {
                        Ok(()) => Some(CancellationAction::Deleted { request_id }),
                        Err(error) => Some(CancellationAction::Failed { request_id, error }),
                    }
                }]
            },

            CancellationAction::Deleted { request_id } => {
                let Some(pending) = state.pending.get(&request_id) else {
                    return SmallVec::new();
                };

                if pending.target.list == ListKind::Waitlist {
                    return smallvec![async_effect! {
                        Some(CancellationAction::Cancelled { request_id, promoted: None })
                    }];
                }

                let records = env.records.clone();
                let clock = env.clock.clone();
                smallvec![async_effect! {
                    match promote_head(&records, &clock).await {
                        Ok(promoted) => Some(CancellationAction::Cancelled { request_id, promoted }),
                        Err(error) => Some(CancellationAction::PromotionFailed { request_id, error }),
                    }
                }]
            },

            CancellationAction::Cancelled {
                request_id,
                promoted,
            } => {
                let pending = state.pending.remove(&request_id);
                state.cancelled += 1;
                if let Some(promotion) = &promoted {
                    state.promoted += 1;
                    tracing::info!(
                        %request_id,
                        from = %promotion.from,
                        to = %promotion.to,
                        "{}님을 대기 목록에서 신청 목록으로 이동했습니다.",
                        promotion.name
                    );
                }
                if let Some(pending) = pending {
                    tracing::info!(%request_id, record = %pending.target, "Record cancelled");
                }
                WorkflowMetrics::record_cancellation(promoted.is_some());
                SmallVec::new()
            },

            CancellationAction::Rejected {
                request_id,
                rejection,
            } => {
                state.pending.remove(&request_id);
                tracing::info!(%request_id, ?rejection, "Cancellation refused");
                SmallVec::new()
            },

            CancellationAction::PromotionFailed { request_id, error } => {
                state.pending.remove(&request_id);
                state.cancelled += 1;
                tracing::error!(%request_id, error = %error, "Registration cancelled but promotion failed");
                SmallVec::new()
            },

            CancellationAction::Failed { request_id, error } => {
                state.pending.remove(&request_id);
                tracing::error!(%request_id, error = %error, "Cancellation failed");
                SmallVec::new()
            },
        }
    }
}

/// Move the earliest waitlist entry into the registration list.
///
/// The head is deleted first, then re-added with `movedFromWaiting` and a
/// fresh timestamp. Returns `None` when the waitlist is empty.
async fn promote_head(
    records: &RosterRepository,
    clock: &Arc<dyn Clock>,
) -> Result<Option<Promotion>, DocumentError> {
    let Some(head) = records.waitlist_head().await? else {
        return Ok(None);
    };

    records.delete(&head.reference).await?;

    let mut registrant = head.registrant;
    registrant.moved_from_waiting = true;
    registrant.timestamp = clock.now_millis();
    let to = records.insert(ListKind::Registrations, &registrant).await?;

    Ok(Some(Promotion {
        from: head.reference.id,
        to,
        name: registrant.name,
        student_id: registrant.student_id,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use crate::secret::SecretHash;
    use crate::types::Registrant;
    use roster_testing::{InMemoryDocumentStore, ReducerTest, assertions, test_clock};

    fn env() -> (WorkflowEnvironment, InMemoryDocumentStore) {
        let documents = InMemoryDocumentStore::new();
        let env = WorkflowEnvironment::new(Arc::new(documents.clone()), Arc::new(test_clock()));
        (env, documents)
    }

    fn record(list: ListKind, id: &str, password: &str) -> Record {
        Record {
            reference: RecordRef::new(list, id),
            registrant: Registrant {
                name: "김이화".to_string(),
                student_id: "20250001".to_string(),
                phone: "010".to_string(),
                affiliation: None,
                residence: crate::types::Residence::NotApplicable,
                residence_phone: String::new(),
                secret: SecretHash::new(password),
                event_id: "1".to_string(),
                timestamp: 1,
                moved_from_waiting: false,
            },
        }
    }

    fn pending(target: RecordRef, authorization: Authorization) -> (CancellationState, RequestId) {
        let request_id = RequestId::new();
        let mut state = CancellationState::default();
        state.pending.insert(
            request_id,
            PendingCancellation {
                target,
                authorization,
            },
        );
        (state, request_id)
    }

    #[tokio::test]
    async fn test_blank_password_is_refused() {
        let (env, _) = env();
        let mut state = CancellationState::default();
        let effects = CancellationReducer.reduce(
            &mut state,
            CancellationAction::Cancel {
                request_id: RequestId::new(),
                target: RecordRef::new(ListKind::Registrations, "a"),
                authorization: Authorization::Secret("  ".to_string()),
            },
            &env,
        );

        assert!(state.pending.is_empty());
        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            CancellationAction::Rejected { rejection: CancelRejection::MissingPassword, .. }
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_is_refused() {
        let (env, _) = env();
        let target = RecordRef::new(ListKind::Registrations, "a");
        let (mut state, request_id) =
            pending(target.clone(), Authorization::Secret("wrong".to_string()));

        let effects = CancellationReducer.reduce(
            &mut state,
            CancellationAction::Loaded {
                request_id,
                record: Some(record(ListKind::Registrations, "a", "right")),
            },
            &env,
        );

        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            CancellationAction::Rejected { rejection: CancelRejection::WrongPassword, .. }
        ));
    }

    #[test]
    fn test_admin_skips_password() {
        let (env, _) = env();
        let (state, request_id) = pending(
            RecordRef::new(ListKind::Registrations, "a"),
            Authorization::Admin,
        );

        ReducerTest::new(CancellationReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(CancellationAction::Loaded {
                request_id,
                record: Some(record(ListKind::Registrations, "a", "right")),
            })
            .then_state(move |state| assert!(state.pending.contains_key(&request_id)))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let (env, _) = env();
        let (mut state, request_id) = pending(
            RecordRef::new(ListKind::Waitlist, "gone"),
            Authorization::Secret("pw".to_string()),
        );

        let effects = CancellationReducer.reduce(
            &mut state,
            CancellationAction::Loaded { request_id, record: None },
            &env,
        );

        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            CancellationAction::Rejected { rejection: CancelRejection::NotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_waitlist_delete_does_not_promote() {
        let (env, _) = env();
        let (mut state, request_id) = pending(
            RecordRef::new(ListKind::Waitlist, "w"),
            Authorization::Admin,
        );

        let effects = CancellationReducer.reduce(
            &mut state,
            CancellationAction::Deleted { request_id },
            &env,
        );

        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(
            action,
            CancellationAction::Cancelled { promoted: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_registration_delete_promotes_head() {
        let (env, documents) = env();
        let head = record(ListKind::Waitlist, "ignored", "pw").registrant;
        let head_id = env.records.insert(ListKind::Waitlist, &head).await.unwrap();
        let (mut state, request_id) = pending(
            RecordRef::new(ListKind::Registrations, "a"),
            Authorization::Admin,
        );

        let effects = CancellationReducer.reduce(
            &mut state,
            CancellationAction::Deleted { request_id },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();

        let CancellationAction::Cancelled { promoted: Some(promotion), .. } = action else {
            panic!("expected a promotion, got {action:?}");
        };
        assert_eq!(promotion.from, head_id);
        assert!(documents.is_empty("waitingList"));

        let promoted: Registrant = documents.documents("applications")[0].decode().unwrap();
        assert!(promoted.moved_from_waiting);
        assert_eq!(promoted.student_id, head.student_id);
        assert_eq!(promoted.timestamp, test_clock().now_millis());
    }

    #[test]
    fn test_cancelled_clears_pending() {
        let (env, _) = env();
        let (state, request_id) = pending(
            RecordRef::new(ListKind::Registrations, "a"),
            Authorization::Admin,
        );

        ReducerTest::new(CancellationReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(CancellationAction::Cancelled {
                request_id,
                promoted: None,
            })
            .then_state(|state| {
                assert!(state.pending.is_empty());
                assert_eq!(state.cancelled, 1);
                assert_eq!(state.promoted, 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
