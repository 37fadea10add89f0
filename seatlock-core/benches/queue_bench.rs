use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use seatlock_core::config::QueueConfig;
use seatlock_core::coordinator::Coordinator;
use seatlock_core::infrastructure_in_memory::InMemoryQueueStore;
use seatlock_core::types::Participant;

fn coordinator() -> Coordinator {
    Coordinator::new(Arc::new(InMemoryQueueStore::new()), QueueConfig::default())
}

fn bench_claim_release(c: &mut Criterion) {
    let coordinator = coordinator();
    let alice = Participant::new("alice");
    let mut now = 0u64;

    c.bench_function("claim_release_cycle", |b| {
        b.iter(|| {
            now += 1;
            let outcome = coordinator.claim("doc", &alice, now).ok();
            coordinator.release("doc", "alice", now).ok();
            black_box(outcome)
        })
    });
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_queue");

    for waiters in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("waiters", waiters), &waiters, |b, &count| {
            b.iter(|| {
                let coordinator = coordinator();
                for i in 0..count {
                    let user = Participant::new(format!("user-{i}"));
                    black_box(coordinator.join("doc", &user, i as u64).ok());
                }
            })
        });
    }

    group.finish();
}

fn bench_heartbeat(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat");

    for waiters in [10, 100, 500] {
        let coordinator = coordinator();
        coordinator.claim("doc", &Participant::new("holder"), 0).ok();
        for i in 0..waiters {
            coordinator.join("doc", &Participant::new(format!("user-{i}")), 0).ok();
        }
        let mut now = 0u64;

        group.bench_with_input(BenchmarkId::new("waiters", waiters), &waiters, |b, _| {
            b.iter(|| {
                now += 1;
                black_box(coordinator.heartbeat("doc", "holder", now).ok());
                black_box(coordinator.heartbeat("doc", "user-0", now).ok());
            })
        });
    }

    group.finish();
}

fn bench_sweep_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_all");

    for resources in [10, 100] {
        group.bench_with_input(BenchmarkId::new("resources", resources), &resources, |b, &count| {
            b.iter(|| {
                let coordinator = coordinator();
                for i in 0..count {
                    coordinator.claim(&format!("doc-{i}"), &Participant::new("alice"), 0).ok();
                }
                black_box(coordinator.sweep_all(60_000).ok())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_claim_release, bench_join, bench_heartbeat, bench_sweep_all);
criterion_main!(benches);
