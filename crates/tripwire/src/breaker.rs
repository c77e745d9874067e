// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use tick::Clock;

use crate::constants::ERR_POISONED_LOCK;
use crate::listeners::{ChangeListener, Listeners, VetoableListener};
use crate::telemetry::{BreakerEvent, Telemetry};
use crate::{AllowedFailures, CircuitBreakerBuilder, Failure, ListenerId, PropertyChange, Status, VetoError};

/// A thread-safe guard that stops calls to a failing resource.
///
/// Callers consult [`is_on`][Self::is_on] before each call to the guarded resource and report
/// the outcome through [`success`][Self::success] or [`failure`][Self::failure]. Once
/// [`threshold`][Self::threshold] consecutive significant failures were reported, the circuit
/// breaker trips and turns [`Off`][Status::Off].
///
/// An off circuit breaker turns itself on again when its status is queried after the
/// [`timeout`][Self::timeout] elapsed. There is no background timer; recovery only happens
/// as part of [`status`][Self::status] and [`is_on`][Self::is_on]. Recovery, automatic or
/// requested through [`turn_on`][Self::turn_on], can be vetoed by vetoable listeners.
///
/// # Examples
///
/// ```rust
/// use std::io;
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tripwire::{AllowedFailures, CircuitBreaker, Status};
///
/// # fn example(clock: &Clock) {
/// let breaker = CircuitBreaker::builder("database", clock)
///     .threshold(3)
///     .timeout(Duration::from_secs(30))
///     .allowed_failures(AllowedFailures::of::<std::num::ParseIntError>())
///     .build();
///
/// for _ in 0..3 {
///     breaker.failure(io::Error::from(io::ErrorKind::ConnectionRefused));
/// }
///
/// assert_eq!(breaker.status(), Status::Off);
/// assert_eq!(breaker.service_level(), 0.0);
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Cow<'static, str>,
    threshold: u32,
    timeout: Duration,
    allowed: AllowedFailures,
    clock: Clock,
    state: Mutex<State>,
    listeners: Listeners,
    telemetry: Telemetry,
}

/// A consistent view of the observable state of a circuit breaker.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BreakerSnapshot {
    /// The current status.
    pub status: Status,
    /// The current service level, between `0.0` and `1.0`.
    pub service_level: f64,
    /// The most recently recorded significant failure.
    pub last_failure: Option<Failure>,
    /// The time the circuit breaker last tripped, if it is off.
    pub tripped_at: Option<SystemTime>,
}

impl CircuitBreaker {
    /// Creates a circuit breaker with default settings: it trips on the first significant
    /// failure and stays off for 5 minutes.
    ///
    /// The `name` identifies the circuit breaker in telemetry and errors. Prefer `snake_case`.
    pub fn new(name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> Self {
        Self::builder(name, clock).build()
    }

    /// Creates a builder to configure a circuit breaker.
    pub fn builder(name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new(name.into(), clock.as_ref())
    }

    pub(crate) fn from_builder(builder: CircuitBreakerBuilder) -> Self {
        Self {
            state: Mutex::new(State::new(builder.threshold)),
            name: builder.name,
            threshold: builder.threshold,
            timeout: builder.timeout,
            allowed: builder.allowed,
            clock: builder.clock,
            listeners: Listeners::default(),
            telemetry: builder.telemetry,
        }
    }

    /// Returns the name of the circuit breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of consecutive significant failures that trip the circuit breaker.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Returns how long the circuit breaker stays off before it attempts to turn itself on.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the current status.
    ///
    /// If the circuit breaker is off and the timeout elapsed, vetoable listeners are consulted
    /// and, unless one of them vetoes, the circuit breaker turns on before the status is returned.
    /// A vetoed attempt leaves the circuit breaker off and is retried on the next query.
    #[must_use]
    pub fn status(&self) -> Status {
        let now = self.clock.instant();

        // NOTE: Vetoable listeners run outside the lock, the epoch detects trips in the meantime.
        let epoch = {
            let state = self.lock();
            if !state.recovery_due(now, self.timeout) {
                return state.status;
            }
            state.epoch
        };

        // A vetoed attempt reports the current status, another thread may have turned it on meanwhile.
        self.recover(Some(epoch)).unwrap_or_else(|_| self.lock().status)
    }

    /// Returns `true` if calls to the guarded resource are allowed.
    ///
    /// See [`status`][Self::status] for the recovery performed as part of this call.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.status() == Status::On
    }

    /// Returns `true` if calls to the guarded resource should not be made.
    ///
    /// See [`status`][Self::status] for the recovery performed as part of this call.
    #[must_use]
    pub fn is_off(&self) -> bool {
        self.status() == Status::Off
    }

    /// Returns the service level, between `0.0` (failing) and `1.0` (healthy).
    ///
    /// The service level is the share of the threshold that is still left before the circuit
    /// breaker trips. It drops with every significant failure and is restored by a success.
    #[must_use]
    pub fn service_level(&self) -> f64 {
        service_level(self.lock().countdown, self.threshold)
    }

    /// Returns the most recently recorded significant failure.
    ///
    /// The failure is kept while the circuit breaker is off and cleared when it turns on again.
    #[must_use]
    pub fn last_failure(&self) -> Option<Failure> {
        self.lock().last_failure.clone()
    }

    /// Returns the time the circuit breaker tripped, or `None` when it is on.
    #[must_use]
    pub fn tripped_at(&self) -> Option<SystemTime> {
        self.lock().tripped_at
    }

    /// Returns a consistent view of the circuit breaker state.
    ///
    /// Unlike [`status`][Self::status], taking a snapshot never attempts to turn the circuit
    /// breaker on.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.lock().snapshot(self.threshold)
    }

    /// Records a successful call to the guarded resource.
    ///
    /// Restores the service level to `1.0`. Ignored while the circuit breaker is off.
    pub fn success(&self) {
        let ((), changes) = self.update(|state| {
            if state.status == Status::On {
                state.countdown = self.threshold;
            }
        });

        self.notify(&changes);
    }

    /// Records a failed call to the guarded resource.
    ///
    /// Allowed failures count as a success. Any other failure lowers the service level,
    /// becomes the [`last_failure`][Self::last_failure], and trips the circuit breaker once
    /// the threshold is reached. Ignored while the circuit breaker is off.
    ///
    /// To record a failure that is already shared, use [`failure_shared`][Self::failure_shared].
    pub fn failure(&self, error: impl std::error::Error + Send + Sync + 'static) {
        self.failure_shared(Arc::new(error));
    }

    /// Records a failed call to the guarded resource from a shared failure.
    ///
    /// See [`failure`][Self::failure].
    pub fn failure_shared(&self, failure: Failure) {
        if self.allowed.matches(&*failure) {
            self.success();
            return;
        }

        let now = self.now();
        let (tripped_by, changes) = self.update(|state| {
            if state.status == Status::Off {
                return None;
            }

            state.countdown = state.countdown.saturating_sub(1);
            state.last_failure = Some(Arc::clone(&failure));

            (state.countdown == 0).then(|| {
                state.trip(now);
                failure
            })
        });

        if let Some(failure) = &tripped_by {
            self.telemetry.report(
                &self.name,
                &BreakerEvent::Tripped {
                    manual: false,
                    last_failure: Some(failure),
                },
            );
        }

        self.notify(&changes);
    }

    /// Turns the circuit breaker off, regardless of its service level.
    ///
    /// Tripping cannot be vetoed. Tripping an off circuit breaker restarts its timeout.
    pub fn trip(&self) {
        let now = self.now();
        let (last_failure, changes) = self.update(|state| {
            state.trip(now);
            state.last_failure.clone()
        });

        self.telemetry.report(
            &self.name,
            &BreakerEvent::Tripped {
                manual: true,
                last_failure: last_failure.as_ref(),
            },
        );

        self.notify(&changes);
    }

    /// Turns the circuit breaker on, without waiting for the timeout.
    ///
    /// Turning on resets the service level to `1.0` and clears the last failure. Turning on
    /// a circuit breaker that is already on does nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`VetoError`] of the first vetoable listener that refused the change. The
    /// circuit breaker stays off in that case.
    pub fn turn_on(&self) -> Result<(), VetoError> {
        if self.lock().status == Status::On {
            return Ok(());
        }

        self.recover(None).map(|_| ())
    }

    /// Registers a listener notified after every change of an observable property.
    ///
    /// Listeners are called synchronously on the thread that changed the circuit breaker, in
    /// registration order, and must be fast. A panicking listener does not affect the circuit
    /// breaker or the other listeners.
    pub fn on_change(&self, listener: impl Fn(&PropertyChange) + Send + Sync + 'static) -> ListenerId {
        self.listeners.add_change(ChangeListener::new(listener))
    }

    /// Registers a listener consulted before the circuit breaker turns on.
    ///
    /// The listener receives the proposed `Status { old: Off, new: On }` change and returns a
    /// [`VetoError`] to keep the circuit breaker off. The first veto wins, later listeners are
    /// not consulted. A panicking listener counts as a veto.
    pub fn on_vetoable_change(
        &self,
        listener: impl Fn(&PropertyChange) -> Result<(), VetoError> + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add_vetoable(VetoableListener::new(listener))
    }

    /// Removes a listener registered with [`on_change`][Self::on_change] or
    /// [`on_vetoable_change`][Self::on_vetoable_change].
    ///
    /// Returns `false` if no such listener is registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub(crate) fn name_cow(&self) -> &Cow<'static, str> {
        &self.name
    }

    /// Attempts to turn the circuit breaker on.
    ///
    /// Automatic attempts pass the epoch of the trip they recover from and are abandoned if the
    /// circuit breaker tripped again in the meantime. Returns the status after the attempt.
    fn recover(&self, epoch: Option<u64>) -> Result<Status, VetoError> {
        let manual = epoch.is_none();
        let proposed = PropertyChange::Status {
            old: Status::Off,
            new: Status::On,
        };

        if let Err(veto) = self.listeners.check(&proposed) {
            self.telemetry.report(&self.name, &BreakerEvent::Vetoed { manual, veto: &veto });
            return Err(veto);
        }

        let now = self.clock.instant();
        let ((off_duration, status), changes) = self.update(|state| {
            if state.status == Status::On || epoch.is_some_and(|epoch| epoch != state.epoch) {
                return (None, state.status);
            }

            let off_duration = state.tripped_instant.map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
            state.turn_on(self.threshold);
            (Some(off_duration), Status::On)
        });

        if let Some(off_duration) = off_duration {
            self.telemetry.report(&self.name, &BreakerEvent::TurnedOn { manual, off_duration });
        }

        self.notify(&changes);
        Ok(status)
    }

    /// Applies `f` to the state and returns the changes it made, for notification after the lock is released.
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> (R, Vec<PropertyChange>) {
        let mut state = self.lock();
        let before = state.snapshot(self.threshold);
        let result = f(&mut state);
        let after = state.snapshot(self.threshold);
        drop(state);

        (result, changes(before, after))
    }

    fn notify(&self, changes: &[PropertyChange]) {
        let panicked = self.listeners.notify(changes);
        if panicked > 0 {
            self.telemetry.report(&self.name, &BreakerEvent::ListenerPanicked { count: panicked });
        }
    }

    fn now(&self) -> Now {
        Now {
            instant: self.clock.instant(),
            system_time: self.clock.system_time(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect(ERR_POISONED_LOCK)
    }
}

#[derive(Debug, Copy, Clone)]
struct Now {
    instant: Instant,
    system_time: SystemTime,
}

#[derive(Debug)]
struct State {
    status: Status,
    /// Significant failures left before the circuit breaker trips.
    countdown: u32,
    last_failure: Option<Failure>,
    tripped_at: Option<SystemTime>,
    tripped_instant: Option<Instant>,
    /// Incremented on every trip.
    epoch: u64,
}

impl State {
    fn new(threshold: u32) -> Self {
        Self {
            status: Status::On,
            countdown: threshold,
            last_failure: None,
            tripped_at: None,
            tripped_instant: None,
            epoch: 0,
        }
    }

    fn trip(&mut self, now: Now) {
        self.status = Status::Off;
        self.countdown = 0;
        self.tripped_at = Some(now.system_time);
        self.tripped_instant = Some(now.instant);
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn turn_on(&mut self, threshold: u32) {
        self.status = Status::On;
        self.countdown = threshold;
        self.last_failure = None;
        self.tripped_at = None;
        self.tripped_instant = None;
    }

    fn recovery_due(&self, now: Instant, timeout: Duration) -> bool {
        // A timeout too large to represent means the circuit breaker never recovers on its own.
        self.status == Status::Off
            && self
                .tripped_instant
                .and_then(|tripped| tripped.checked_add(timeout))
                .is_some_and(|enable_at| now >= enable_at)
    }

    fn snapshot(&self, threshold: u32) -> BreakerSnapshot {
        BreakerSnapshot {
            status: self.status,
            service_level: service_level(self.countdown, threshold),
            last_failure: self.last_failure.clone(),
            tripped_at: self.tripped_at,
        }
    }
}

fn service_level(countdown: u32, threshold: u32) -> f64 {
    f64::from(countdown) / f64::from(threshold)
}

/// Lists the properties that differ between two snapshots. The status change comes last.
#[expect(clippy::float_cmp, reason = "both service levels are computed from the same integer ratio")]
fn changes(before: BreakerSnapshot, after: BreakerSnapshot) -> Vec<PropertyChange> {
    let mut changes = Vec::new();

    if before.service_level != after.service_level {
        changes.push(PropertyChange::ServiceLevel {
            old: before.service_level,
            new: after.service_level,
        });
    }

    let same_failure = match (&before.last_failure, &after.last_failure) {
        (None, None) => true,
        (Some(old), Some(new)) => Arc::ptr_eq(old, new),
        _ => false,
    };
    if !same_failure {
        changes.push(PropertyChange::LastFailure {
            old: before.last_failure,
            new: after.last_failure,
        });
    }

    if before.tripped_at != after.tripped_at {
        changes.push(PropertyChange::TrippedAt {
            old: before.tripped_at,
            new: after.tripped_at,
        });
    }

    if before.status != after.status {
        changes.push(PropertyChange::Status {
            old: before.status,
            new: after.status,
        });
    }

    changes
}
