// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![expect(missing_docs, reason = "benchmark code")]
use std::hint::black_box;
use std::io;

use alloc_tracker::{Allocator, Session};
use criterion::{Criterion, criterion_group, criterion_main};
use tick::Clock;
use tripwire::{AllowedFailures, CircuitBreaker};

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

fn entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");
    let session = Session::new();
    let clock = Clock::new_frozen();

    // Healthy breaker, the hot path of every guarded call
    let breaker = CircuitBreaker::new("bench", &clock);
    let operation = session.operation("is-on");
    group.bench_function("is-on", |b| {
        b.iter(|| {
            let _span = operation.measure_thread();
            black_box(breaker.is_on());
        });
    });

    let operation = session.operation("call-success");
    group.bench_function("call-success", |b| {
        b.iter(|| {
            let _span = operation.measure_thread();
            _ = black_box(breaker.call(|| Ok::<_, io::Error>(42)));
        });
    });

    // Allowed failures never change the state, so no listener is notified
    let breaker = CircuitBreaker::builder("bench", &clock)
        .allowed_failures(AllowedFailures::of::<io::Error>())
        .build();
    let operation = session.operation("allowed-failure");
    group.bench_function("allowed-failure", |b| {
        b.iter(|| {
            let _span = operation.measure_thread();
            breaker.failure(io::Error::from(io::ErrorKind::NotFound));
        });
    });

    // Off breaker rejecting calls until the timeout elapses
    let breaker = CircuitBreaker::new("bench", &clock);
    breaker.trip();
    let operation = session.operation("call-rejected");
    group.bench_function("call-rejected", |b| {
        b.iter(|| {
            let _span = operation.measure_thread();
            _ = black_box(breaker.call(|| Ok::<_, io::Error>(42)));
        });
    });

    group.finish();
    session.print_to_stdout();
}

criterion_group!(benches, entry);
criterion_main!(benches);
