//! Declarative macros for ergonomic effect construction
//!
//! Workflows issue most document reads and writes as `Effect::Future`
//! blocks, so these macros remove the `Box::pin(async move { .. })` noise.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use roster_core::async_effect;
///
/// async_effect! {
///     match records.count(ListKind::Registrations).await {
///         Ok(count) => Some(RegistrationAction::OccupancyChecked { request_id, count }),
///         Err(e) => Some(RegistrationAction::StorageFailed { request_id, error: e.to_string() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug)]
    enum TestAction {
        Loaded { value: i32 },
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::Loaded { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[tokio::test]
    async fn test_async_effect_resolves_to_action() {
        let effect = async_effect! { Some(TestAction::Loaded { value: 7 }) };
        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! always builds Effect::Future");
        };
        assert!(matches!(fut.await, Some(TestAction::Loaded { value: 7 })));
    }
}
