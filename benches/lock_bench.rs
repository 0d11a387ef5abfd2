use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use leaselock::client::LockClient;
use leaselock::infrastructure_in_memory::InMemoryLockStore;
use leaselock::policy::LockPolicy;
use std::sync::Arc;

fn bench_acquire_release_cycle(c: &mut Criterion) {
    let client = LockClient::in_memory(LockPolicy::default()).unwrap();

    c.bench_function("acquire_release_cycle", |b| {
        b.iter(|| {
            let handle = client.acquire("bench-job").unwrap();
            black_box(client.release(&handle).unwrap())
        })
    });
}

fn bench_contended_try_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_try_acquire");

    for client_count in [2, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("clients", client_count),
            &client_count,
            |b, &count| {
                let store = Arc::new(InMemoryLockStore::new());
                let clients: Vec<_> = (0..count)
                    .map(|_| LockClient::new(store.clone(), LockPolicy::default()).unwrap())
                    .collect();

                b.iter(|| {
                    // Everyone races for the same name; exactly one wins
                    let mut winner = None;
                    for client in &clients {
                        if let Ok(handle) = client.try_acquire("hot-job") {
                            winner = Some((client, handle));
                        }
                    }
                    if let Some((client, handle)) = winner.take() {
                        client.release(&handle).unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_touch(c: &mut Criterion) {
    let client = LockClient::in_memory(LockPolicy::default()).unwrap();
    let handle = client.acquire("renewed-job").unwrap();

    c.bench_function("touch_renewal", |b| {
        b.iter(|| black_box(client.touch(&handle).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_acquire_release_cycle,
    bench_contended_try_acquire,
    bench_touch
);
criterion_main!(benches);
