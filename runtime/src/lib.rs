//! # Roster Runtime
//!
//! Runtime implementation for Roster workflows.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Runs effect futures and feeds their actions back to reducers
//! - **Waiters**: Hand each HTTP request the terminal action it is waiting for
//!
//! ## Example
//!
//! ```ignore
//! use roster_runtime::Store;
//!
//! let store = Store::new(
//!     RegistrationState::default(),
//!     RegistrationReducer::new(),
//!     environment,
//! );
//!
//! // Send an action and wait for its outcome
//! let outcome = store
//!     .send_and_wait_for(action, |a| a.is_terminal_for(request_id), timeout)
//!     .await?;
//!
//! // Read state
//! let pending = store.state(|s| s.pending.len()).await;
//! ```

use roster_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, oneshot};

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Why a store call did not produce what the caller asked for
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Shutdown has started; no new actions are reduced
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown deadline passed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action arrived within the wait timeout
        ///
        /// The workflow may still finish and persist its result.
        #[error("Timed out waiting for the request outcome")]
        Timeout,

        /// The request ended without a usable outcome
        ///
        /// The waiter was dropped before a matching action reached it, or
        /// the workflow answered with an action the caller cannot map to a
        /// result.
        #[error("Request ended without an outcome")]
        NoOutcome,
    }
}

pub use error::StoreError;

pub mod health;

pub use health::{HealthCheck, HealthReport, HealthStatus};

/// Store configuration
///
/// ```ignore
/// let config = StoreConfig::default().with_backlog_threshold(1024);
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Pending effect count above which the store reports itself degraded
    pub backlog_threshold: usize,
}

impl StoreConfig {
    /// Set the degraded-health backlog threshold
    #[must_use]
    pub const fn with_backlog_threshold(mut self, threshold: usize) -> Self {
        self.backlog_threshold = threshold;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: 256,
        }
    }
}

/// Counts one running effect task until dropped, panics included.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A caller parked in [`Store::send_and_wait_for`].
struct Waiter<A> {
    id: u64,
    accepts: Box<dyn Fn(&A) -> bool + Send + Sync>,
    reply: oneshot::Sender<A>,
}

/// Parked callers, completed in arrival order and at most once each.
///
/// Every effect-produced action is offered here before it is reduced.
struct Waiters<A> {
    next_id: AtomicU64,
    parked: Mutex<Vec<Waiter<A>>>,
}

impl<A: Clone> Waiters<A> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            parked: Mutex::new(Vec::new()),
        }
    }

    async fn park<F>(&self, accepts: F) -> (u64, oneshot::Receiver<A>)
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, outcome) = oneshot::channel();
        self.parked.lock().await.push(Waiter {
            id,
            accepts: Box::new(accepts),
            reply,
        });
        (id, outcome)
    }

    async fn forget(&self, id: u64) {
        self.parked.lock().await.retain(|waiter| waiter.id != id);
    }

    async fn deliver(&self, action: &A) {
        let waiter = {
            let mut parked = self.parked.lock().await;
            let matched = parked.iter().position(|waiter| (waiter.accepts)(action));
            matched.map(|index| parked.remove(index))
        };

        if let Some(waiter) = waiter {
            if waiter.reply.send(action.clone()).is_err() {
                tracing::debug!(waiter = waiter.id, "Waiter left before its outcome arrived");
            }
        }
    }

    async fn len(&self) -> usize {
        self.parked.lock().await.len()
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, Duration, Effect, HealthCheck, InFlight, Ordering, Reducer,
        RwLock, StoreConfig, StoreError, Waiters,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Callers waiting for the outcome of their request
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        waiters: Arc<Waiters<A>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Sync + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default()`].
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                waiters: Arc::new(Waiters::new()),
            }
        }

        /// Number of effects currently executing across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Perform a health check on the Store
        ///
        /// - Unhealthy once shutdown has started
        /// - Degraded while the effect backlog exceeds the configured threshold
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let pending = self.pending_effects();

            let check = if self.shutdown.load(Ordering::Acquire) {
                HealthCheck::unhealthy("store", "Store is shutting down")
            } else if pending > self.config.backlog_threshold {
                HealthCheck::degraded("store", format!("{pending} effects pending"))
            } else {
                HealthCheck::healthy("store")
            };

            check
                .with_metadata("pending_effects", pending.to_string())
                .with_metadata(
                    "backlog_threshold",
                    self.config.backlog_threshold.to_string(),
                )
        }

        /// Stop accepting actions and wait for running effects to drain
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still
        /// running when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let pending = self.pending_effects();
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if tokio::time::Instant::now() >= deadline {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        /// Reduce an action and start the effects it returns
        ///
        /// Returns once the effects are spawned, not when they finish.
        /// Concurrent calls serialize on the state lock.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!(effects = effects.len(), "Reducer completed");
                effects
            };

            for effect in effects {
                self.spawn_effect(effect);
            }

            Ok(())
        }

        /// Send an action and wait for the effect-produced action that
        /// settles it
        ///
        /// The caller is parked before the action is sent, so even an
        /// outcome produced immediately is delivered. Each effect-produced
        /// action completes at most one waiter: the oldest one whose
        /// predicate accepts it. Give every request its own id and match on
        /// it so concurrent callers never take each other's outcome.
        ///
        /// The initial action itself is never delivered.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        /// - [`StoreError::NoOutcome`]: the store dropped the waiter
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool + Send + Sync + 'static,
        {
            let (waiter, outcome) = self.waiters.park(predicate).await;

            if let Err(error) = self.send(action).await {
                self.waiters.forget(waiter).await;
                return Err(error);
            }

            match tokio::time::timeout(timeout, outcome).await {
                Ok(Ok(action)) => Ok(action),
                Ok(Err(_)) => Err(StoreError::NoOutcome),
                Err(_) => {
                    self.waiters.forget(waiter).await;
                    metrics::counter!("store.requests.timed_out").increment(1);
                    Err(StoreError::Timeout)
                },
            }
        }

        /// Number of callers currently parked in [`Store::send_and_wait_for`]
        pub async fn waiting(&self) -> usize {
            self.waiters.len().await
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let pending = store.state(|s| s.pending.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Run one effect on its own task
        ///
        /// A failing future is expected to return a failure action. A
        /// panicking one is logged by tokio and still releases its
        /// [`InFlight`] slot.
        fn spawn_effect(&self, effect: Effect<A>)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    let in_flight = InFlight::enter(&self.pending_effects);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _in_flight = in_flight;

                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    });
                },
            }
        }

        /// Offer an effect-produced action to the waiters, then reduce it
        async fn feed_back(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            self.waiters.deliver(&action).await;

            if let Err(error) = self.send(action).await {
                tracing::warn!(%error, "Dropped feedback action");
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                waiters: Arc::clone(&self.waiters),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
