// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;

/// A recorded failure of a guarded call.
///
/// Failures are shared so that the circuit breaker can hand out the last failure to any number
/// of observers without cloning the underlying error.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Refusal of a vetoable listener to let the circuit breaker turn on.
///
/// Vetoable listeners return this error to keep the circuit breaker off. When the refused
/// recovery was requested explicitly through [`CircuitBreaker::turn_on`][crate::CircuitBreaker::turn_on],
/// the error is handed back to the caller unchanged.
#[derive(Debug, Clone, Error)]
#[error("turning on the circuit breaker was vetoed: {reason}")]
pub struct VetoError {
    reason: Cow<'static, str>,
    #[source]
    source: Option<Failure>,
}

impl VetoError {
    /// Creates a veto with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    /// Attaches the error that caused the veto.
    #[must_use]
    pub fn caused_by(self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            ..self
        }
    }

    /// Returns the reason supplied by the vetoing listener.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Error returned by [`CircuitBreaker::call`][crate::CircuitBreaker::call].
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The circuit breaker is off and the operation was not invoked.
    #[error("circuit breaker '{name}' is off")]
    Rejected {
        /// Name of the circuit breaker that rejected the call.
        name: Cow<'static, str>,
        /// The failure that was recorded last before the call was rejected, if any.
        #[source]
        last_failure: Option<Failure>,
    },

    /// The operation was invoked and failed.
    ///
    /// The error is shared with the circuit breaker, which keeps it as its last failure.
    #[error(transparent)]
    Failed(Arc<E>),
}

impl<E> GuardError<E> {
    /// Returns `true` if the call was rejected without invoking the operation.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns the error of the failed operation, if the operation was invoked.
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Rejected { .. } => None,
            Self::Failed(error) => Some(error),
        }
    }
}
