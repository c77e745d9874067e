// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of consecutive significant failures that trip the circuit breaker.
pub(crate) const DEFAULT_THRESHOLD: u32 = 1;

/// Smallest accepted threshold. Lower values are clamped to this one.
pub(crate) const MIN_THRESHOLD: u32 = 1;

/// Default duration the circuit breaker stays off before it attempts to turn itself on again.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because the circuit breaker state can no longer be trusted";
