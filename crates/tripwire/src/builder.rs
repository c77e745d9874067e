// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use tick::Clock;

use crate::constants::{DEFAULT_THRESHOLD, DEFAULT_TIMEOUT, MIN_THRESHOLD};
use crate::telemetry::Telemetry;
use crate::{AllowedFailures, CircuitBreaker, CircuitBreakerOptions};

/// Builder for [`CircuitBreaker`].
///
/// Created by [`CircuitBreaker::builder`] or [`CircuitBreakerOptions::builder`].
///
/// # Defaults
///
/// | Setting | Default |
/// |---|---|
/// | [`threshold`][Self::threshold] | `1` |
/// | [`timeout`][Self::timeout] | 5 minutes |
/// | [`allowed_failures`][Self::allowed_failures] | [`AllowedFailures::none`] |
/// | logs, metrics | disabled |
#[derive(Debug)]
#[must_use]
pub struct CircuitBreakerBuilder {
    pub(crate) name: Cow<'static, str>,
    pub(crate) clock: Clock,
    pub(crate) threshold: u32,
    pub(crate) timeout: Duration,
    pub(crate) allowed: AllowedFailures,
    pub(crate) telemetry: Telemetry,
}

impl CircuitBreakerBuilder {
    pub(crate) fn new(name: Cow<'static, str>, clock: &Clock) -> Self {
        Self {
            name,
            clock: clock.clone(),
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            allowed: AllowedFailures::none(),
            telemetry: Telemetry::default(),
        }
    }

    /// Sets the number of consecutive significant failures that trip the circuit breaker.
    ///
    /// A threshold of zero is treated as `1`.
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(MIN_THRESHOLD);
        self
    }

    /// Sets how long the circuit breaker stays off before it attempts to turn itself on.
    ///
    /// A zero timeout makes the circuit breaker attempt to turn on at the next status query.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the failures that are expected and never count against the circuit breaker.
    pub fn allowed_failures(mut self, allowed: AllowedFailures) -> Self {
        self.allowed = allowed;
        self
    }

    /// Applies the threshold and timeout from configuration.
    pub fn options(self, options: &CircuitBreakerOptions) -> Self {
        self.threshold(options.threshold).timeout(options.timeout)
    }

    /// Emits `tracing` events when the circuit breaker trips, turns on, or refuses to turn on.
    #[cfg(any(feature = "logs", test))]
    pub fn enable_logs(mut self) -> Self {
        self.telemetry.logs_enabled = true;
        self
    }

    /// Reports circuit breaker events to the `circuit_breaker.event` counter of the given provider.
    #[cfg(any(feature = "metrics", test))]
    pub fn enable_metrics(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = crate::metrics::create_meter(meter_provider);
        self.telemetry.event_reporter = Some(crate::metrics::create_event_counter(&meter));
        self
    }

    /// Builds the circuit breaker. It starts [`On`][crate::Status::On] with a service level of `1.0`.
    #[must_use]
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::from_builder(self)
    }
}
