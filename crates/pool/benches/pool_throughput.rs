// Pool throughput benchmarks.
//
// Measures raw pool acquire/release overhead with a zero-cost resource
// (no I/O, instant create/validate/cleanup).

use std::hint::black_box;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use reservoir_pool::{Pool, PoolConfig, Resource, Result};

// -- Minimal no-op resource for benchmarking pool overhead only --

struct NoOpResource;

#[async_trait]
impl Resource for NoOpResource {
    type Args = ();
    type Instance = u64;

    fn id(&self) -> &str {
        "bench-noop"
    }

    async fn create(&self, _args: &()) -> Result<u64> {
        Ok(0)
    }
}

fn pool_config(min_size: usize, max_size: usize) -> PoolConfig {
    PoolConfig {
        min_size,
        max_size,
        acquire_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn single_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = rt
        .block_on(Pool::new(NoOpResource, (), pool_config(1, 64)))
        .expect("failed to create pool");

    c.bench_function("single_thread_acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let conn = pool.acquire().await.unwrap();
                black_box(*conn);
                pool.release(conn).unwrap();
            }
        });
    });
}

fn multi_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let pool = rt
        .block_on(Pool::new(NoOpResource, (), pool_config(8, 64)))
        .expect("failed to create pool");

    c.bench_function("multi_thread_acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let conn = pool.acquire().await.unwrap();
                tokio::task::yield_now().await;
                pool.release(conn).unwrap();
            }
        });
    });
}

fn concurrent_contention(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");

    // Small pool to create contention.
    let pool = rt
        .block_on(Pool::new(NoOpResource, (), pool_config(4, 4)))
        .expect("failed to create pool");

    c.bench_function("contended_acquire_release_4slots", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let tasks: Vec<_> = (0..8)
                    .map(|_| {
                        let pool = pool.clone();
                        tokio::spawn(async move {
                            let conn = pool.acquire().await.unwrap();
                            tokio::task::yield_now().await;
                            pool.release(conn).unwrap();
                        })
                    })
                    .collect();
                for task in tasks {
                    task.await.unwrap();
                }
            }
        });
    });
}

criterion_group!(
    benches,
    single_thread_throughput,
    multi_thread_throughput,
    concurrent_contention,
);
criterion_main!(benches);
