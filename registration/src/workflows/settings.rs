//! Admin settings control.
//!
//! The settings singleton is created lazily with [`Settings::initial`] the
//! first time anything reads it. Toggle and capacity changes are single
//! field overwrites, so concurrent subscribers see each change once.

use super::WorkflowEnvironment;
use crate::error::RosterError;
use crate::repository::RosterRepository;
use crate::types::{RequestId, Settings};
use roster_core::document::{DocumentError, Result as DocumentResult, encode};
use roster_core::environment::Clock;
use roster_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use roster_runtime::StoreError;
use serde_json::json;
use std::sync::Arc;

/// Actions of the settings workflow.
#[derive(Clone, Debug)]
pub enum SettingsAction {
    /// Read the singleton, creating it if needed
    Load {
        /// Correlation id
        request_id: RequestId,
    },
    /// Flip the open/closed flag
    Toggle {
        /// Correlation id
        request_id: RequestId,
    },
    /// Replace the capacity
    SetCapacity {
        /// Correlation id
        request_id: RequestId,
        /// Requested capacity, as entered
        capacity: i64,
    },
    /// The singleton was read
    Loaded {
        /// Correlation id
        request_id: RequestId,
        /// Current values
        settings: Settings,
    },
    /// The singleton was written
    Updated {
        /// Correlation id
        request_id: RequestId,
        /// Values after the write
        settings: Settings,
    },
    /// Capacity was not a positive integer
    Rejected {
        /// Correlation id
        request_id: RequestId,
        /// Value that was refused
        capacity: i64,
    },
    /// A store read or write failed
    Failed {
        /// Correlation id
        request_id: RequestId,
        /// Underlying error
        error: DocumentError,
    },
}

impl SettingsAction {
    /// Correlation id carried by every action.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Load { request_id }
            | Self::Toggle { request_id }
            | Self::SetCapacity { request_id, .. }
            | Self::Loaded { request_id, .. }
            | Self::Updated { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Whether this action ends the request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Loaded { .. } | Self::Updated { .. } | Self::Rejected { .. } | Self::Failed { .. }
        )
    }

    /// The outcome as a domain result.
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` for a rejected capacity and `Storage` for a failed
    /// read or write.
    pub fn into_result(self) -> Result<Settings, RosterError> {
        match self {
            Self::Loaded { settings, .. } | Self::Updated { settings, .. } => Ok(settings),
            Self::Rejected { .. } => Err(RosterError::InvalidCapacity),
            Self::Failed { error, .. } => Err(RosterError::Storage(error)),
            Self::Load { .. } | Self::Toggle { .. } | Self::SetCapacity { .. } => {
                Err(RosterError::Store(StoreError::NoOutcome))
            },
        }
    }
}

/// Last settings seen by the workflow.
#[derive(Clone, Debug, Default)]
pub struct SettingsState {
    /// Most recent read or write, `None` until the first one completes
    pub current: Option<Settings>,
}

/// Reducer for admin settings.
#[derive(Clone, Debug, Default)]
pub struct SettingsReducer;

impl SettingsReducer {
    /// Creates a new `SettingsReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Read the singleton, writing the defaults first if it does not exist.
///
/// # Errors
///
/// Propagates store failures.
pub async fn load_or_create(
    records: &RosterRepository,
    clock: &dyn Clock,
) -> DocumentResult<Settings> {
    if let Some(settings) = records.settings().await? {
        return Ok(settings);
    }
    let settings = Settings::initial(clock.now_millis());
    records.put_settings(&settings).await?;
    tracing::info!(max_capacity = settings.max_capacity, "Settings initialized");
    Ok(settings)
}

fn write_effect<F>(
    request_id: RequestId,
    records: RosterRepository,
    clock: Arc<dyn Clock>,
    change: F,
) -> Effect<SettingsAction>
where
    F: FnOnce(Settings) -> Settings + Send + 'static,
{
    async_effect! {
        let result = async {
            let current = load_or_create(&records, clock.as_ref()).await?;
            let next = change(current);
            records
                .update_settings(encode(&json!({
                    "isClosed": next.is_closed,
                    "maxCapacity": next.max_capacity,
                }))?)
                .await?;
            Ok::<_, DocumentError>(next)
        }
        .await;

        match result {
            Ok(settings) => Some(SettingsAction::Updated { request_id, settings }),
            Err(error) => Some(SettingsAction::Failed { request_id, error }),
        }
    }
}

impl Reducer for SettingsReducer {
    type State = SettingsState;
    type Action = SettingsAction;
    type Environment = WorkflowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SettingsAction::Load { request_id } => {
                let records = env.records.clone();
                let clock = Arc::clone(&env.clock);
                smallvec![async_effect! {
                    match load_or_create(&records, clock.as_ref()).await {
                        Ok(settings) => Some(SettingsAction::Loaded { request_id, settings }),
                        Err(error) => Some(SettingsAction::Failed { request_id, error }),
                    }
                }]
            },

            SettingsAction::Toggle { request_id } => smallvec![write_effect(
                request_id,
                env.records.clone(),
                Arc::clone(&env.clock),
                |settings| Settings {
                    is_closed: !settings.is_closed,
                    ..settings
                },
            )],

            SettingsAction::SetCapacity {
                request_id,
                capacity,
            } => {
                let Some(max_capacity) = u32::try_from(capacity).ok().filter(|c| *c >= 1) else {
                    return smallvec![async_effect! {
                        Some(SettingsAction::Rejected { request_id, capacity })
                    }];
                };
                smallvec![write_effect(
                    request_id,
                    env.records.clone(),
                    Arc::clone(&env.clock),
                    move |settings| Settings {
                        max_capacity,
                        ..settings
                    },
                )]
            },

            SettingsAction::Loaded { settings, .. } => {
                state.current = Some(settings);
                SmallVec::new()
            },

            SettingsAction::Updated {
                request_id,
                settings,
            } => {
                tracing::info!(
                    %request_id,
                    is_closed = settings.is_closed,
                    max_capacity = settings.max_capacity,
                    "Settings updated"
                );
                state.current = Some(settings);
                SmallVec::new()
            },

            SettingsAction::Rejected {
                request_id,
                capacity,
            } => {
                tracing::info!(%request_id, capacity, "Capacity refused");
                SmallVec::new()
            },

            SettingsAction::Failed { request_id, error } => {
                tracing::error!(%request_id, error = %error, "Settings request failed");
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::{DEFAULT_CAPACITY, SETTINGS_COLLECTION};
    use roster_testing::{InMemoryDocumentStore, ReducerTest, WriteOp, assertions, test_clock};

    fn env() -> (WorkflowEnvironment, InMemoryDocumentStore) {
        let documents = InMemoryDocumentStore::new();
        let env = WorkflowEnvironment::new(Arc::new(documents.clone()), Arc::new(test_clock()));
        (env, documents)
    }

    #[tokio::test]
    async fn test_first_read_creates_defaults() {
        let (env, documents) = env();
        let settings = load_or_create(&env.records, env.clock.as_ref()).await.unwrap();

        assert_eq!(settings.max_capacity, DEFAULT_CAPACITY);
        assert!(!settings.is_closed);
        assert_eq!(documents.len(SETTINGS_COLLECTION), 1);

        let again = load_or_create(&env.records, env.clock.as_ref()).await.unwrap();
        assert_eq!(again, settings);
    }

    #[tokio::test]
    async fn test_toggle_flips_flag() {
        let (env, _) = env();
        let mut state = SettingsState::default();

        let effects = SettingsReducer.reduce(
            &mut state,
            SettingsAction::Toggle {
                request_id: RequestId::new(),
            },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();
        let settings = action.into_result().unwrap();
        assert!(settings.is_closed);

        let effects = SettingsReducer.reduce(
            &mut state,
            SettingsAction::Toggle {
                request_id: RequestId::new(),
            },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(!action.into_result().unwrap().is_closed);
        assert!(!env.records.settings().await.unwrap().unwrap().is_closed);
    }

    #[tokio::test]
    async fn test_capacity_must_be_positive() {
        let (env, documents) = env();
        for capacity in [0, -3, i64::from(u32::MAX) + 1] {
            let effects = SettingsReducer.reduce(
                &mut SettingsState::default(),
                SettingsAction::SetCapacity {
                    request_id: RequestId::new(),
                    capacity,
                },
                &env,
            );
            let action = assertions::resolve_first_future(effects).await.unwrap();
            assert!(matches!(action, SettingsAction::Rejected { .. }));
        }
        assert!(documents.is_empty(SETTINGS_COLLECTION));
    }

    #[tokio::test]
    async fn test_capacity_below_occupancy_is_accepted() {
        let (env, _) = env();
        let effects = SettingsReducer.reduce(
            &mut SettingsState::default(),
            SettingsAction::SetCapacity {
                request_id: RequestId::new(),
                capacity: 1,
            },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert_eq!(action.into_result().unwrap().max_capacity, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let (env, documents) = env();
        load_or_create(&env.records, env.clock.as_ref()).await.unwrap();
        documents.fail_next(WriteOp::Update, SETTINGS_COLLECTION);

        let effects = SettingsReducer.reduce(
            &mut SettingsState::default(),
            SettingsAction::Toggle {
                request_id: RequestId::new(),
            },
            &env,
        );
        let action = assertions::resolve_first_future(effects).await.unwrap();
        assert!(matches!(action, SettingsAction::Failed { .. }));
    }

    #[test]
    fn test_loaded_records_current() {
        let (env, _) = env();
        let settings = Settings::initial(5);
        ReducerTest::new(SettingsReducer::new())
            .with_env(env)
            .given_state(SettingsState::default())
            .when_action(SettingsAction::Loaded {
                request_id: RequestId::new(),
                settings,
            })
            .then_state(move |state| assert_eq!(state.current, Some(settings)))
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
