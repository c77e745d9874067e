// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(
    not(all(feature = "logs", feature = "metrics")),
    expect(
        rustdoc::broken_intra_doc_links,
        reason = "builder telemetry methods only exist when their features are enabled"
    )
)]

//! A veto-able ON/OFF circuit breaker for guarding calls to unreliable resources.
//!
//! A [`CircuitBreaker`] watches the outcome of calls to a resource such as a database or a
//! remote service. After a configured number of consecutive significant failures it trips and
//! turns [`Off`][Status::Off], telling callers to stop using the resource. Once the timeout
//! elapsed, the next status query turns it [`On`][Status::On] again, unless a registered
//! vetoable listener objects.
//!
//! Unlike the three-state circuit breakers found in resilience middleware, this circuit breaker
//! has no half-open probing state and no background timer. It is a plain, synchronous state
//! machine that is safe to share between threads.
//!
//! # Core Types
//!
//! - [`CircuitBreaker`]: The state machine. Record outcomes with [`success`][CircuitBreaker::success]
//!   and [`failure`][CircuitBreaker::failure], or let [`call`][CircuitBreaker::call] do it for you.
//! - [`AllowedFailures`]: Classifies expected failures that never count against the circuit breaker.
//! - [`PropertyChange`]: Describes a change observed by listeners registered with
//!   [`on_change`][CircuitBreaker::on_change] and [`on_vetoable_change`][CircuitBreaker::on_vetoable_change].
//! - [`CircuitBreakerOptions`]: Threshold and timeout, loadable from configuration.
//!
//! # Quick Start
//!
//! ```rust
//! use std::io;
//! use std::time::Duration;
//!
//! use tick::Clock;
//! use tripwire::{CircuitBreaker, GuardError, VetoError};
//!
//! # fn example(clock: &Clock, database_ready: fn() -> bool) {
//! let breaker = CircuitBreaker::builder("database", clock)
//!     .threshold(3)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//!
//! // Keep the circuit breaker off while the database is known to be unavailable.
//! breaker.on_vetoable_change(move |_| {
//!     if database_ready() {
//!         Ok(())
//!     } else {
//!         Err(VetoError::new("database is not ready"))
//!     }
//! });
//!
//! match breaker.call(query) {
//!     Ok(rows) => println!("fetched {rows} rows"),
//!     Err(GuardError::Rejected { .. }) => println!("database is unavailable, using the cache"),
//!     Err(GuardError::Failed(error)) => println!("query failed: {error}"),
//! }
//! # }
//! # fn query() -> Result<usize, io::Error> { Ok(1) }
//! ```
//!
//! > **Note**: The circuit breaker reads time from the [`Clock`][tick::Clock] of the [`tick`] crate,
//! > so tests can control recovery with `tick::ClockControl`.
//!
//! # Features
//!
//! - `logs`: Enables [`enable_logs`][CircuitBreakerBuilder::enable_logs], which emits `tracing`
//!   events when a circuit breaker trips, turns on, or refuses to turn on.
//! - `metrics`: Enables [`enable_metrics`][CircuitBreakerBuilder::enable_metrics], which reports
//!   the same events to an OpenTelemetry counter. See [`telemetry`] for the attribute keys.
//! - `serde`: Enables deserialization of [`CircuitBreakerOptions`].

mod allowed;
mod breaker;
mod builder;
mod constants;
mod error;
mod fn_wrapper;
mod guard;
mod listeners;
mod options;
mod status;

pub mod telemetry;

#[cfg(any(feature = "metrics", test))]
mod metrics;

pub use allowed::AllowedFailures;
pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use builder::CircuitBreakerBuilder;
pub use error::{Failure, GuardError, VetoError};
pub(crate) use fn_wrapper::define_fn_wrapper;
pub use listeners::{ListenerId, PropertyChange};
pub use options::CircuitBreakerOptions;
pub use status::Status;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
