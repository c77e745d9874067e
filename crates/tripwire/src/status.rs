// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Display, Formatter};

/// The protective state of a [`CircuitBreaker`][crate::CircuitBreaker].
///
/// A circuit breaker is always in exactly one of these two states. It starts [`On`][Status::On]
/// and cycles between the states for as long as it lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Calls to the guarded resource are allowed.
    #[default]
    On,

    /// The circuit breaker has tripped and calls to the guarded resource should not be made.
    Off,
}

impl Status {
    /// Returns the `snake_case` name of the status, as used in telemetry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
