//! Password-gated self-service edit.
//!
//! Only name, phone, affiliation and the residence fields change. Student
//! id, event id, timestamp and list membership stay as they are.

use super::WorkflowEnvironment;
use crate::error::RosterError;
use crate::types::{Affiliation, Amendment, Record, RecordRef, RequestId, Residence};
use crate::validation::{ValidationError, normalize_residence, validate_amendment};
use roster_core::document::{DocumentError, encode};
use roster_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use roster_runtime::metrics::WorkflowMetrics;
use serde::Serialize;
use std::collections::HashMap;

/// Why an edit was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmendRejection {
    /// A required field is blank
    Invalid(&'static str),
    /// Nothing stored at the reference
    NotFound,
    /// Password does not match
    WrongPassword,
}

impl AmendRejection {
    const fn label(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::NotFound => "not_found",
            Self::WrongPassword => "wrong_password",
        }
    }

    /// Convert into the domain error for `target`.
    #[must_use]
    pub fn into_error(self, target: RecordRef) -> RosterError {
        match self {
            Self::Invalid(message) => RosterError::Invalid(message.to_string()),
            Self::NotFound => RosterError::RecordNotFound(Some(target)),
            Self::WrongPassword => RosterError::WrongPassword,
        }
    }
}

/// Actions of the edit workflow.
#[derive(Clone, Debug)]
pub enum AmendmentAction {
    /// Overwrite the mutable fields of a record
    Amend {
        /// Correlation id
        request_id: RequestId,
        /// Record to edit
        target: RecordRef,
        /// Current password
        password: String,
        /// New field values
        changes: Amendment,
    },
    /// The target was read
    Loaded {
        /// Correlation id
        request_id: RequestId,
        /// The record, if it still exists
        record: Option<Record>,
    },
    /// The fields were written
    Amended {
        /// Correlation id
        request_id: RequestId,
    },
    /// Refused without a write
    Rejected {
        /// Correlation id
        request_id: RequestId,
        /// Reason
        rejection: AmendRejection,
    },
    /// A store read or write failed
    Failed {
        /// Correlation id
        request_id: RequestId,
        /// Underlying error
        error: DocumentError,
    },
}

impl AmendmentAction {
    /// Correlation id carried by every action.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Amend { request_id, .. }
            | Self::Loaded { request_id, .. }
            | Self::Amended { request_id }
            | Self::Rejected { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Whether this action ends the request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Amended { .. } | Self::Rejected { .. } | Self::Failed { .. }
        )
    }
}

/// An edit in flight.
#[derive(Clone, Debug)]
pub struct PendingAmendment {
    /// Record to edit
    pub target: RecordRef,
    /// Supplied password
    pub password: String,
    /// Fields to write, already normalized
    pub fields: AmendedFields,
}

/// Document fields written by an edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AmendedFields {
    /// Full name
    pub name: String,
    /// Contact phone
    pub phone: String,
    /// School affiliation
    #[serde(rename = "schoolType")]
    pub affiliation: Affiliation,
    /// Residence status
    #[serde(rename = "dormitoryStatus")]
    pub residence: Residence,
    /// Dormitory or study-hall phone
    #[serde(rename = "dormitoryPhone")]
    pub residence_phone: String,
}

impl AmendedFields {
    /// Fields for `changes`, with the residence reset unless it applies.
    #[must_use]
    pub fn new(changes: &Amendment, affiliation: Affiliation) -> Self {
        let (residence, residence_phone) =
            normalize_residence(affiliation, changes.residence, &changes.residence_phone);
        Self {
            name: changes.name.trim().to_owned(),
            phone: changes.phone.trim().to_owned(),
            affiliation,
            residence,
            residence_phone,
        }
    }
}

/// Edit workflow state.
#[derive(Clone, Debug, Default)]
pub struct AmendmentState {
    /// Edits in flight
    pub pending: HashMap<RequestId, PendingAmendment>,
}

/// Reducer for self-service edit.
#[derive(Clone, Debug, Default)]
pub struct AmendmentReducer;

impl AmendmentReducer {
    /// Creates a new `AmendmentReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(request_id: RequestId, rejection: AmendRejection) -> Effect<AmendmentAction> {
        async_effect! {
            Some(AmendmentAction::Rejected { request_id, rejection })
        }
    }
}

impl Reducer for AmendmentReducer {
    type State = AmendmentState;
    type Action = AmendmentAction;
    type Environment = WorkflowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AmendmentAction::Amend {
                request_id,
                target,
                password,
                changes,
            } => {
                let affiliation = match validate_amendment(&changes, &password) {
                    Ok(affiliation) => affiliation,
                    Err(ValidationError(message)) => {
                        return smallvec![Self::reject(request_id, AmendRejection::Invalid(message))];
                    },
                };

                state.pending.insert(
                    request_id,
                    PendingAmendment {
                        target: target.clone(),
                        password,
                        fields: AmendedFields::new(&changes, affiliation),
                    },
                );

                let records = env.records.clone();
                smallvec![async_effect! {
                    match records.get(&target).await {
                        Ok(record) => Some(AmendmentAction::Loaded { request_id, record }),
                        Err(error) => Some(AmendmentAction::Failed { request_id, error }),
                    }
                }]
            },

            AmendmentAction::Loaded { request_id, record } => {
                let Some(pending) = state.pending.get(&request_id) else {
                    return SmallVec::new();
                };

                let Some(record) = record else {
                    return smallvec![Self::reject(request_id, AmendRejection::NotFound)];
                };
                if !record.registrant.secret.verify(&pending.password) {
                    return smallvec![Self::reject(request_id, AmendRejection::WrongPassword)];
                }

                let fields = match encode(&pending.fields) {
                    Ok(fields) => fields,
                    Err(error) => {
                        return smallvec![async_effect! {
                            Some(AmendmentAction::Failed { request_id, error })
                        }];
                    },
                };

                let target = pending.target.clone();
                let records = env.records.clone();
                smallvec![async_effect! {
                    match records.update(&target, fields).await {
                        Ok(()) => Some(AmendmentAction::Amended { request_id }),
                        Err(error) => Some(AmendmentAction::Failed { request_id, error }),
                    }
                }]
            },

            AmendmentAction::Amended { request_id } => {
                if let Some(pending) = state.pending.remove(&request_id) {
                    tracing::info!(%request_id, record = %pending.target, "Record amended");
                }
                WorkflowMetrics::record_edit("amended");
                SmallVec::new()
            },

            AmendmentAction::Rejected {
                request_id,
                rejection,
            } => {
                state.pending.remove(&request_id);
                tracing::info!(%request_id, reason = rejection.label(), "Edit refused");
                WorkflowMetrics::record_edit(rejection.label());
                SmallVec::new()
            },

            AmendmentAction::Failed { request_id, error } => {
                state.pending.remove(&request_id);
                tracing::error!(%request_id, error = %error, "Edit failed");
                WorkflowMetrics::record_edit("failed");
                SmallVec::new()
            },
        }
    }
}
