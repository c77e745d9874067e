// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;

crate::define_fn_wrapper!(Predicate(Fn(&(dyn Error + 'static)) -> bool));

/// Classifies failures that are expected and must not count against a circuit breaker.
///
/// Failures matched by `AllowedFailures` are treated as successful calls: they restore the
/// service level and never trip the breaker. Everything else is a significant failure.
///
/// The default classifier allows nothing, so every failure counts.
///
/// # Examples
///
/// ```rust
/// use std::io;
///
/// use tripwire::AllowedFailures;
///
/// // Invalid input is a caller problem, not a sign of an unhealthy resource.
/// let allowed = AllowedFailures::of::<std::num::ParseIntError>()
///     .or(AllowedFailures::new(|error| {
///         error
///             .downcast_ref::<io::Error>()
///             .is_some_and(|e| e.kind() == io::ErrorKind::InvalidInput)
///     }));
///
/// assert!(allowed.matches(&io::Error::from(io::ErrorKind::InvalidInput)));
/// assert!(!allowed.matches(&io::Error::from(io::ErrorKind::TimedOut)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AllowedFailures {
    predicate: Option<Predicate>,
}

impl AllowedFailures {
    /// Allows no failures; every failure counts against the circuit breaker.
    #[must_use]
    pub fn none() -> Self {
        Self { predicate: None }
    }

    /// Allows the failures for which `predicate` returns `true`.
    #[must_use]
    pub fn new(predicate: impl Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Predicate::new(predicate)),
        }
    }

    /// Allows failures whose concrete error type is `E`.
    #[must_use]
    pub fn of<E: Error + 'static>() -> Self {
        Self::new(|error| error.is::<E>())
    }

    /// Allows failures matched by either `self` or `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self.predicate, other.predicate) {
            (None, None) => Self::none(),
            (Some(p), None) | (None, Some(p)) => Self { predicate: Some(p) },
            (Some(first), Some(second)) => Self::new(move |error| first.call(error) || second.call(error)),
        }
    }

    /// Applies the classifier to the root cause of a failure instead of the failure itself.
    ///
    /// The root cause is the last error reachable through [`Error::source`].
    #[must_use]
    pub fn root_cause(self) -> Self {
        match self.predicate {
            None => Self::none(),
            Some(p) => Self::new(move |error| {
                let mut cause = error;
                while let Some(next) = cause.source() {
                    cause = next;
                }
                p.call(cause)
            }),
        }
    }

    /// Allows a failure if the failure or any error in its [`Error::source`] chain is allowed.
    #[must_use]
    pub fn in_chain(self) -> Self {
        match self.predicate {
            None => Self::none(),
            Some(p) => Self::new(move |error| std::iter::successors(Some(error), |&e| e.source()).any(|e| p.call(e))),
        }
    }

    /// Returns `true` if `error` is an allowed failure.
    #[must_use]
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        self.predicate.as_ref().is_some_and(|p| p.call(error))
    }
}
