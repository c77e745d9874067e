// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Guards a simulated inventory service that suffers an outage:
//!
//! 1. Consecutive connection failures trip the circuit breaker
//! 2. Calls are rejected while the circuit breaker is off
//! 3. A vetoable listener keeps it off until the service reports healthy again
//! 4. The circuit breaker turns on once the timeout elapsed and the veto is lifted
//!
//! Time is simulated with `ClockControl` so the example runs instantly.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tick::ClockControl;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tripwire::{AllowedFailures, CircuitBreaker, GuardError, PropertyChange, VetoError};

fn main() {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();

    let control = ClockControl::new();
    let healthy = Arc::new(AtomicBool::new(true));

    let breaker = CircuitBreaker::builder("inventory", control.to_clock())
        // Decrease the following values to see the circuit breaker trip faster
        .threshold(3)
        .timeout(Duration::from_secs(10))
        // Missing items are a normal answer of the service, not a sign of an outage
        .allowed_failures(AllowedFailures::new(|error| {
            matches!(error.downcast_ref::<InventoryError>(), Some(InventoryError::NotFound(_)))
        }))
        .enable_logs()
        .build();

    breaker.on_change(|change| {
        if let PropertyChange::Status { old, new } = change {
            println!("status changed from {old} to {new}");
        }
    });

    let health = Arc::clone(&healthy);
    breaker.on_vetoable_change(move |_| {
        if health.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(VetoError::new("health probe still failing"))
        }
    });

    for second in 0..40_u32 {
        // The outage starts at 5s and ends at 25s
        healthy.store(!(5..25).contains(&second), Ordering::Relaxed);

        match breaker.call(|| fetch_stock(second, healthy.load(Ordering::Relaxed))) {
            Ok(stock) => println!("{second}s: {stock} items in stock"),
            Err(GuardError::Rejected { .. }) => println!("{second}s: rejected, serving cached stock"),
            Err(GuardError::Failed(error)) => println!("{second}s: {error}"),
        }

        control.advance(Duration::from_secs(1));
    }
}

#[derive(Debug, thiserror::Error)]
enum InventoryError {
    #[error("item {0} not found")]
    NotFound(u32),
    #[error("inventory service unavailable")]
    Unavailable(#[from] io::Error),
}

fn fetch_stock(item: u32, healthy: bool) -> Result<u32, InventoryError> {
    if !healthy {
        return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
    }

    if item % 7 == 0 {
        return Err(InventoryError::NotFound(item));
    }

    Ok(item * 3)
}
