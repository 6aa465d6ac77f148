//! # Roster Testing
//!
//! Testing utilities for the Roster registration service.
//!
//! This crate provides:
//! - Deterministic clocks
//! - An in-memory [`DocumentStore`](roster_core::document::DocumentStore)
//! - Given/When/Then helpers for reducers
//!
//! ## Example
//!
//! ```ignore
//! use roster_testing::{InMemoryDocumentStore, ManualClock};
//! use roster_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_submit_lands_in_registrations() {
//!     let documents = Arc::new(InMemoryDocumentStore::new());
//!     let env = WorkflowEnvironment::new(documents.clone(), Arc::new(ManualClock::stepping()));
//!     let store = Store::new(RegistrationState::default(), RegistrationReducer, env);
//!
//!     submit(&store, form("홍길동", "20250001")).await?;
//!     assert_eq!(documents.len("applications"), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use roster_core::environment::Clock;

pub mod document_store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use roster_testing::mocks::FixedClock;
    /// use roster_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to, or by a fixed step per reading.
    ///
    /// Waitlist order is decided by `timestamp`, so tests that insert
    /// several records need distinct, increasing readings.
    ///
    /// ```
    /// use roster_testing::mocks::ManualClock;
    /// use roster_core::environment::Clock;
    ///
    /// let clock = ManualClock::stepping();
    /// assert!(clock.now_millis() < clock.now_millis());
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        millis: Arc<AtomicI64>,
        step_millis: i64,
    }

    impl ManualClock {
        /// Clock frozen at `start` until [`ManualClock::advance`] is called
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
                step_millis: 0,
            }
        }

        /// Clock starting at 2025-01-01 that moves 1ms after every reading
        #[must_use]
        pub fn stepping() -> Self {
            Self::new(test_clock().now()).with_step(Duration::from_millis(1))
        }

        /// Move forward by `step` after every reading
        #[must_use]
        pub fn with_step(mut self, step: Duration) -> Self {
            self.step_millis = i64::try_from(step.as_millis()).unwrap_or(i64::MAX);
            self
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
            self.millis.fetch_add(by, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            let millis = self.millis.fetch_add(self.step_millis, Ordering::SeqCst);
            DateTime::from_timestamp_millis(millis).unwrap_or_default()
        }
    }
}

// Re-export commonly used items
pub use document_store::{InMemoryDocumentStore, WriteOp};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
