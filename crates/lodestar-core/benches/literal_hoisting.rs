//! Literal Hoisting Benchmark
//!
//! Measures constant code generation:
//! - Immediates vs hoisted literals
//! - Repeated hoisting of the same literal (cache reuse)
//! - Device count impact

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lodestar_core::codegen::{CgenState, CompilationOptions, ConstantCodegen, ExecutorDeviceType};
use lodestar_core::string_dictionary::StringDictionaryRegistry;
use lodestar_core::types::{Constant, EncodingType};
use std::hint::black_box;

fn constants(count: usize) -> Vec<Constant> {
    (0..count)
        .map(|i| match i % 3 {
            0 => Constant::int(i as i32),
            1 => Constant::double(i as f64 * 0.5),
            _ => Constant::text(format!("literal-{i}")),
        })
        .collect()
}

fn benchmark_codegen_modes(c: &mut Criterion) {
    let dictionaries = StringDictionaryRegistry::new();
    let mut group = c.benchmark_group("constant_codegen");

    for count in [16, 128, 1024] {
        let constants = constants(count);
        for hoist_literals in [false, true] {
            let co = CompilationOptions {
                device_type: ExecutorDeviceType::Gpu,
                hoist_literals,
            };
            let label = if hoist_literals { "hoisted" } else { "immediate" };
            group.bench_with_input(BenchmarkId::new(label, count), &constants, |b, constants| {
                b.iter(|| {
                    let mut state = CgenState::new("bench", 2).unwrap();
                    let mut codegen = ConstantCodegen::new(&mut state, &dictionaries);
                    for constant in constants {
                        black_box(codegen.codegen(constant, EncodingType::None, 0, &co).unwrap());
                    }
                });
            });
        }
    }
    group.finish();
}

fn benchmark_repeated_literal(c: &mut Criterion) {
    let dictionaries = StringDictionaryRegistry::new();
    let mut group = c.benchmark_group("repeated_literal");
    let co = CompilationOptions::defaults(ExecutorDeviceType::Gpu);

    for devices in [1, 2, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(devices), &devices, |b, &devices| {
            b.iter(|| {
                let mut state = CgenState::new("bench", devices).unwrap();
                let mut codegen = ConstantCodegen::new(&mut state, &dictionaries);
                for _ in 0..64 {
                    black_box(
                        codegen
                            .codegen(&Constant::bigint(42), EncodingType::None, 0, &co)
                            .unwrap(),
                    );
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_codegen_modes, benchmark_repeated_literal);
criterion_main!(benches);
