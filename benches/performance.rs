use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbroute::core::{Endpoint, EndpointPool};
use dbroute::{AccessIntent, Router, SelectionPolicy};
use std::sync::Arc;

/// Build a pool with all endpoints healthy
fn create_healthy_pool(readers: usize) -> EndpointPool {
    let writer = Arc::new(Endpoint::new_writer("writer", "127.0.0.1:5432".parse().unwrap()));
    writer.record_probe_success();

    let readers = (0..readers)
        .map(|i| {
            let reader = Arc::new(Endpoint::new_reader(
                format!("reader-{}", i),
                format!("127.0.0.1:{}", 6000 + i).parse().unwrap(),
            ));
            reader.record_probe_success();
            reader
        })
        .collect();

    EndpointPool::new(writer, readers).unwrap()
}

fn bench_route_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_read");

    for policy in [
        SelectionPolicy::RoundRobin,
        SelectionPolicy::LeastRecentlyUsed,
        SelectionPolicy::LeastInFlight,
    ] {
        for readers in [2usize, 8, 32] {
            let router = Router::new(create_healthy_pool(readers), policy);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", policy), readers),
                &readers,
                |b, _| {
                    b.iter(|| {
                        let decision = router.route(AccessIntent::Read, None).unwrap();
                        black_box(decision.endpoint_id().len());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_route_write_and_fallback(c: &mut Criterion) {
    let router = Router::new(create_healthy_pool(4), SelectionPolicy::RoundRobin);
    c.bench_function("route_write", |b| {
        b.iter(|| black_box(router.route(AccessIntent::Write, None).unwrap().fallback))
    });

    let degraded = Router::new(create_healthy_pool(4), SelectionPolicy::RoundRobin);
    for reader in degraded.pool().readers() {
        for _ in 0..3 {
            reader.record_probe_failure(3);
        }
    }
    c.bench_function("route_read_fallback", |b| {
        b.iter(|| black_box(degraded.route(AccessIntent::Read, None).unwrap().fallback))
    });
}

criterion_group!(benches, bench_route_read, bench_route_write_and_fallback);
criterion_main!(benches);
