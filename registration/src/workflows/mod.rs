//! Roster workflows.
//!
//! Each workflow is a reducer running in its own [`Store`]. Handlers talk to
//! them through [`RosterWorkflows`], which sends a command with a fresh
//! [`RequestId`] and waits for that request's terminal action.

pub mod amendment;
pub mod cancellation;
pub mod registration;
pub mod settings;

use crate::error::RosterError;
use crate::repository::RosterRepository;
use crate::types::{Amendment, RecordId, RecordRef, RegistrationForm, RequestId, Settings};
use amendment::{AmendmentAction, AmendmentReducer, AmendmentState};
use cancellation::{Authorization, CancellationAction, CancellationReducer, CancellationState, Promotion};
use registration::{RegistrationAction, RegistrationReducer, RegistrationState};
use roster_core::document::DocumentStore;
use roster_core::environment::Clock;
use roster_runtime::{HealthCheck, Store, StoreConfig, StoreError};
use serde::Serialize;
use settings::{SettingsAction, SettingsReducer, SettingsState};
use std::sync::Arc;
use std::time::Duration;

/// Dependencies shared by every workflow.
#[derive(Clone)]
pub struct WorkflowEnvironment {
    /// Source of timestamps
    pub clock: Arc<dyn Clock>,
    /// Roster persistence
    pub records: RosterRepository,
}

impl WorkflowEnvironment {
    /// Environment over `documents` using `clock` for timestamps.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: RosterRepository::new(documents),
        }
    }
}

impl std::fmt::Debug for WorkflowEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEnvironment")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

/// Store running the registration workflow.
pub type RegistrationStore =
    Store<RegistrationState, RegistrationAction, WorkflowEnvironment, RegistrationReducer>;
/// Store running the cancellation workflow.
pub type CancellationStore =
    Store<CancellationState, CancellationAction, WorkflowEnvironment, CancellationReducer>;
/// Store running the edit workflow.
pub type AmendmentStore =
    Store<AmendmentState, AmendmentAction, WorkflowEnvironment, AmendmentReducer>;
/// Store running the settings workflow.
pub type SettingsStore = Store<SettingsState, SettingsAction, WorkflowEnvironment, SettingsReducer>;

/// Where a successful submission landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Submission {
    /// Stored in `applications`
    Accepted {
        /// New record
        id: RecordId,
    },
    /// Stored in `waitingList`
    Waitlisted {
        /// New record
        id: RecordId,
        /// 1-based waiting number
        position: usize,
    },
}

/// Request/response access to all four workflows.
#[derive(Clone)]
pub struct RosterWorkflows {
    registration: Arc<RegistrationStore>,
    cancellation: Arc<CancellationStore>,
    amendment: Arc<AmendmentStore>,
    settings: Arc<SettingsStore>,
    timeout: Duration,
}

impl RosterWorkflows {
    /// Start the four stores over one environment.
    ///
    /// `timeout` bounds how long a request waits for its outcome.
    #[must_use]
    pub fn new(env: WorkflowEnvironment, timeout: Duration) -> Self {
        Self::with_config(env, timeout, StoreConfig::default())
    }

    /// Like [`RosterWorkflows::new`], with `config` applied to every store.
    #[must_use]
    pub fn with_config(env: WorkflowEnvironment, timeout: Duration, config: StoreConfig) -> Self {
        Self {
            registration: Arc::new(Store::with_config(
                RegistrationState::default(),
                RegistrationReducer::new(),
                env.clone(),
                config.clone(),
            )),
            cancellation: Arc::new(Store::with_config(
                CancellationState::default(),
                CancellationReducer::new(),
                env.clone(),
                config.clone(),
            )),
            amendment: Arc::new(Store::with_config(
                AmendmentState::default(),
                AmendmentReducer::new(),
                env.clone(),
                config.clone(),
            )),
            settings: Arc::new(Store::with_config(
                SettingsState::default(),
                SettingsReducer::new(),
                env,
                config,
            )),
            timeout,
        }
    }

    /// The registration store, for state inspection.
    #[must_use]
    pub fn registration_store(&self) -> &RegistrationStore {
        &self.registration
    }

    /// The cancellation store, for state inspection.
    #[must_use]
    pub fn cancellation_store(&self) -> &CancellationStore {
        &self.cancellation
    }

    /// Current settings, creating the defaults on first use.
    ///
    /// # Errors
    ///
    /// Storage failures or a timeout.
    pub async fn settings(&self) -> Result<Settings, RosterError> {
        let request_id = RequestId::new();
        self.settings
            .send_and_wait_for(
                SettingsAction::Load { request_id },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?
            .into_result()
    }

    /// Submit a registration against the current settings.
    ///
    /// # Errors
    ///
    /// `RegistrationClosed`, `Invalid`, `AlreadyRegistered` or
    /// `AlreadyWaitlisted` when refused, storage failures or a timeout.
    #[tracing::instrument(skip(self, form), fields(student_id = %form.student_id))]
    pub async fn submit(&self, form: RegistrationForm) -> Result<Submission, RosterError> {
        let settings = self.settings().await?;
        let request_id = RequestId::new();

        let outcome = self
            .registration
            .send_and_wait_for(
                RegistrationAction::Submit {
                    request_id,
                    form,
                    settings,
                },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?;

        match outcome {
            RegistrationAction::Accepted { id, .. } => Ok(Submission::Accepted { id }),
            RegistrationAction::Waitlisted { id, position, .. } => {
                Ok(Submission::Waitlisted { id, position })
            },
            RegistrationAction::Rejected { rejection, .. } => Err(rejection.into()),
            RegistrationAction::Failed { error, .. } => Err(RosterError::Storage(error)),
            _ => Err(RosterError::Store(StoreError::NoOutcome)),
        }
    }

    /// Cancel a record, promoting the waitlist head when a registration frees
    /// a slot.
    ///
    /// # Errors
    ///
    /// `Invalid` for a blank password, `RecordNotFound`, `WrongPassword`,
    /// `PromotionFailed` when the record is gone but the head did not move,
    /// storage failures or a timeout.
    #[tracing::instrument(skip(self, authorization), fields(record = %target))]
    pub async fn cancel(
        &self,
        target: RecordRef,
        authorization: Authorization,
    ) -> Result<Option<Promotion>, RosterError> {
        let request_id = RequestId::new();
        let outcome = self
            .cancellation
            .send_and_wait_for(
                CancellationAction::Cancel {
                    request_id,
                    target: target.clone(),
                    authorization,
                },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?;

        match outcome {
            CancellationAction::Cancelled { promoted, .. } => Ok(promoted),
            CancellationAction::Rejected { rejection, .. } => Err(rejection.into_error(target)),
            CancellationAction::PromotionFailed { error, .. } => {
                Err(RosterError::PromotionFailed(error))
            },
            CancellationAction::Failed { error, .. } => Err(RosterError::Storage(error)),
            _ => Err(RosterError::Store(StoreError::NoOutcome)),
        }
    }

    /// Overwrite the mutable fields of a record after checking its password.
    ///
    /// # Errors
    ///
    /// `Invalid`, `RecordNotFound`, `WrongPassword`, storage failures or a
    /// timeout.
    #[tracing::instrument(skip(self, password, changes), fields(record = %target))]
    pub async fn amend(
        &self,
        target: RecordRef,
        password: String,
        changes: Amendment,
    ) -> Result<(), RosterError> {
        let request_id = RequestId::new();
        let outcome = self
            .amendment
            .send_and_wait_for(
                AmendmentAction::Amend {
                    request_id,
                    target: target.clone(),
                    password,
                    changes,
                },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?;

        match outcome {
            AmendmentAction::Amended { .. } => Ok(()),
            AmendmentAction::Rejected { rejection, .. } => Err(rejection.into_error(target)),
            AmendmentAction::Failed { error, .. } => Err(RosterError::Storage(error)),
            _ => Err(RosterError::Store(StoreError::NoOutcome)),
        }
    }

    /// Flip the open/closed flag.
    ///
    /// # Errors
    ///
    /// Storage failures or a timeout.
    pub async fn toggle_closed(&self) -> Result<Settings, RosterError> {
        let request_id = RequestId::new();
        self.settings
            .send_and_wait_for(
                SettingsAction::Toggle { request_id },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?
            .into_result()
    }

    /// Replace the capacity.
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` unless `capacity` is a positive integer, storage
    /// failures or a timeout.
    pub async fn set_capacity(&self, capacity: i64) -> Result<Settings, RosterError> {
        let request_id = RequestId::new();
        self.settings
            .send_and_wait_for(
                SettingsAction::SetCapacity {
                    request_id,
                    capacity,
                },
                move |a| a.request_id() == request_id && a.is_terminal(),
                self.timeout,
            )
            .await?
            .into_result()
    }

    /// Health of each workflow store.
    #[must_use]
    pub fn health(&self) -> Vec<HealthCheck> {
        [
            ("registration", self.registration.health()),
            ("cancellation", self.cancellation.health()),
            ("amendment", self.amendment.health()),
            ("settings", self.settings.health()),
        ]
        .into_iter()
        .map(|(workflow, mut check)| {
            check.component = format!("{workflow}_store");
            check
        })
        .collect()
    }

    /// Stop accepting requests and wait for in-flight effects.
    ///
    /// # Errors
    ///
    /// `ShutdownTimeout` if any store still has effects running at the
    /// deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        let (registration, cancellation, amendment, settings) = tokio::join!(
            self.registration.shutdown(timeout),
            self.cancellation.shutdown(timeout),
            self.amendment.shutdown(timeout),
            self.settings.shutdown(timeout),
        );
        registration?;
        cancellation?;
        amendment?;
        settings
    }
}

impl std::fmt::Debug for RosterWorkflows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterWorkflows")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
