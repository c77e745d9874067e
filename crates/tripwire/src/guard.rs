// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::{CircuitBreaker, GuardError};

impl CircuitBreaker {
    /// Runs `operation` if the circuit breaker is on and records its outcome.
    ///
    /// When the circuit breaker is off, `operation` is not invoked and
    /// [`GuardError::Rejected`] is returned with the failure that tripped the circuit breaker.
    /// Otherwise `Ok` results are recorded as a [`success`][Self::success] and errors as a
    /// [`failure`][Self::failure], subject to the allowed failures of the circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Rejected`] when the circuit breaker is off, or
    /// [`GuardError::Failed`] with the error returned by `operation`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::io;
    ///
    /// use tick::Clock;
    /// use tripwire::{CircuitBreaker, GuardError};
    ///
    /// # fn example(clock: &Clock) {
    /// let breaker = CircuitBreaker::new("inventory", clock);
    ///
    /// let result = breaker.call(|| Err::<(), _>(io::Error::other("connection reset")));
    /// assert!(matches!(result, Err(GuardError::Failed(_))));
    ///
    /// let result = breaker.call(|| Ok::<_, io::Error>("unreachable"));
    /// assert!(matches!(result, Err(GuardError::Rejected { .. })));
    /// # }
    /// ```
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.is_on() {
            return Err(GuardError::Rejected {
                name: self.name_cow().clone(),
                last_failure: self.last_failure(),
            });
        }

        match operation() {
            Ok(value) => {
                self.success();
                Ok(value)
            }
            Err(error) => {
                let error = Arc::new(error);
                self.failure_shared(Arc::<E>::clone(&error));
                Err(GuardError::Failed(error))
            }
        }
    }
}
