//! Kernel Dispatch Benchmark
//!
//! Compares thread-pool backends spawning and joining small kernels.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lodestar_core::config::ThreadPoolConfig;
use lodestar_core::threadpool::{KernelDispatcher, ThreadPoolBackend};
use std::hint::black_box;

fn benchmark_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_dispatch");
    group.sample_size(20);

    for backend in [
        ThreadPoolBackend::Futures,
        ThreadPoolBackend::WorkStealing,
        ThreadPoolBackend::Inline,
    ] {
        let dispatcher = KernelDispatcher::new(&ThreadPoolConfig {
            backend: Some(backend),
            kernel_arena_width: 4,
            ..Default::default()
        })
        .unwrap();

        for tasks in [4, 32] {
            group.bench_with_input(
                BenchmarkId::new(backend.to_string(), tasks),
                &tasks,
                |b, &tasks| {
                    b.iter(|| {
                        let mut pool = dispatcher.pool::<u64>();
                        for i in 0..tasks as u64 {
                            pool.spawn(move || (0..1_000u64).fold(i, |acc, x| acc ^ x))
                                .unwrap();
                        }
                        black_box(pool.join().unwrap())
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_backends);
criterion_main!(benches);
