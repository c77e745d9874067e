// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Well-known attribute keys and event names emitted by circuit breakers.
//!
//! Keys are dot-separated and values are short `snake_case` strings, following the
//! [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations).

use std::borrow::Cow;
use std::time::Duration;

#[cfg(any(feature = "metrics", feature = "logs", test))]
use crate::Status;
use crate::{Failure, VetoError};

/// Key used to annotate the name of the circuit breaker.
pub const BREAKER_NAME: &str = "circuit_breaker.name";

/// Key used to annotate the circuit breaker event being emitted.
///
/// Values are `tripped`, `turned_on`, `vetoed` and `listener_panicked`.
pub const EVENT_NAME: &str = "circuit_breaker.event.name";

/// Key used to annotate the status of the circuit breaker after the event.
pub const BREAKER_STATUS: &str = "circuit_breaker.status";

#[derive(Debug, Clone, Default)]
pub(crate) struct Telemetry {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    pub(crate) logs_enabled: bool,
}

#[derive(Debug)]
#[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "event details are only read when logging"))]
pub(crate) enum BreakerEvent<'a> {
    Tripped { manual: bool, last_failure: Option<&'a Failure> },
    TurnedOn { manual: bool, off_duration: Duration },
    Vetoed { manual: bool, veto: &'a VetoError },
    ListenerPanicked { count: usize },
}

#[cfg(any(feature = "metrics", test))]
impl BreakerEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tripped { .. } => "tripped",
            Self::TurnedOn { .. } => "turned_on",
            Self::Vetoed { .. } => "vetoed",
            Self::ListenerPanicked { .. } => "listener_panicked",
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Tripped { .. } | Self::Vetoed { .. } => Some(Status::Off),
            Self::TurnedOn { .. } => Some(Status::On),
            Self::ListenerPanicked { .. } => None,
        }
    }
}

impl Telemetry {
    pub fn report(&self, breaker_name: &Cow<'static, str>, event: &BreakerEvent<'_>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.event_reporter {
            let name = opentelemetry::KeyValue::new(BREAKER_NAME, breaker_name.clone());
            let event_name = opentelemetry::KeyValue::new(EVENT_NAME, event.name());

            match event.status() {
                Some(status) => reporter.add(1, &[name, event_name, opentelemetry::KeyValue::new(BREAKER_STATUS, status.as_str())]),
                None => reporter.add(1, &[name, event_name]),
            }
        }

        if self.logs_enabled {
            #[cfg(any(feature = "logs", test))]
            log(breaker_name, event);
        }

        _ = (breaker_name, event);
    }
}

#[cfg(any(feature = "logs", test))]
fn log(breaker_name: &str, event: &BreakerEvent<'_>) {
    match *event {
        BreakerEvent::Tripped { manual, last_failure } => {
            tracing::event!(
                name: "tripwire.circuit_breaker.tripped",
                tracing::Level::WARN,
                circuit_breaker.name = %breaker_name,
                circuit_breaker.event = "tripped",
                circuit_breaker.status = Status::Off.as_str(),
                circuit_breaker.manual = manual,
                circuit_breaker.last_failure = last_failure.map(tracing::field::display),
            );
        }
        BreakerEvent::TurnedOn { manual, off_duration } => {
            tracing::event!(
                name: "tripwire.circuit_breaker.turned_on",
                tracing::Level::INFO,
                circuit_breaker.name = %breaker_name,
                circuit_breaker.event = "turned_on",
                circuit_breaker.status = Status::On.as_str(),
                circuit_breaker.manual = manual,
                circuit_breaker.off.duration_ms = u64::try_from(off_duration.as_millis()).unwrap_or(u64::MAX),
            );
        }
        // Automatic recovery is retried on every status query, so its vetoes are only worth a debug event.
        BreakerEvent::Vetoed { manual: false, veto } => {
            tracing::event!(
                name: "tripwire.circuit_breaker.vetoed",
                tracing::Level::DEBUG,
                circuit_breaker.name = %breaker_name,
                circuit_breaker.event = "vetoed",
                circuit_breaker.status = Status::Off.as_str(),
                circuit_breaker.manual = false,
                circuit_breaker.veto.reason = veto.reason(),
            );
        }
        BreakerEvent::Vetoed { manual: true, veto } => {
            tracing::event!(
                name: "tripwire.circuit_breaker.vetoed",
                tracing::Level::WARN,
                circuit_breaker.name = %breaker_name,
                circuit_breaker.event = "vetoed",
                circuit_breaker.status = Status::Off.as_str(),
                circuit_breaker.manual = true,
                circuit_breaker.veto.reason = veto.reason(),
            );
        }
        BreakerEvent::ListenerPanicked { count } => {
            tracing::event!(
                name: "tripwire.circuit_breaker.listener_panicked",
                tracing::Level::ERROR,
                circuit_breaker.name = %breaker_name,
                circuit_breaker.event = "listener_panicked",
                circuit_breaker.listeners.panicked = count,
            );
        }
    }
}
