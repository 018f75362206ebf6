//! # Factorplan Performance Benchmarks
//!
//! Measures the operations the optimizer trades off:
//! - Plan construction per table
//! - Planned whole-factor updates vs the naive per-edge update
//! - Cost estimation without buffer construction

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use factorplan_core::engine::estimate::estimate_optimized_costs;
use factorplan_core::{FactorRuntime, FactorTable, FactorUpdatePlan, SumProductAdapter};

/// A dense table over `num_dims` dimensions of size `dim` with deterministic
/// positive weights.
fn synthetic_table(num_dims: usize, dim: usize) -> FactorTable {
    let cardinality = dim.pow(num_dims as u32);
    let values: Vec<f64> = (0..cardinality)
        .map(|i| 1.0 + ((i * 7) % 13) as f64)
        .collect();
    FactorTable::new_dense(&vec![dim; num_dims], values).expect("valid synthetic table")
}

fn synthetic_runtime(table: &FactorTable) -> FactorRuntime {
    let mut runtime = FactorRuntime::for_table(table);
    for edge in 0..table.num_dims() {
        let d = table.dims()[edge];
        let msg: Vec<f64> = (0..d).map(|i| 1.0 + (i % 3) as f64).collect();
        runtime
            .set_in_message(edge, &msg)
            .expect("message lengths match the table");
    }
    runtime
}

/// The naive update: one full marginalization of the joint table per edge.
fn naive_update(table: &FactorTable, runtime: &mut FactorRuntime) {
    let dims: Vec<usize> = table.dims().to_vec();
    for out_edge in 0..dims.len() {
        let mut out = vec![0.0; dims[out_edge]];
        for (joint, &value) in table.values().iter().enumerate() {
            let mut rest = joint;
            let mut product = value;
            let mut out_coord = 0;
            for (d, &size) in dims.iter().enumerate() {
                let coord = rest % size;
                rest /= size;
                if d == out_edge {
                    out_coord = coord;
                } else {
                    product *= runtime.in_message(d)[coord];
                }
            }
            out[out_coord] += product;
        }
        let sum: f64 = out.iter().sum();
        for v in &mut out {
            *v /= sum;
        }
        black_box(&out);
    }
}

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");
    for num_dims in [4usize, 6, 8] {
        let table = synthetic_table(num_dims, 4);
        group.bench_with_input(BenchmarkId::from_parameter(num_dims), &table, |b, table| {
            b.iter(|| {
                FactorUpdatePlan::build(black_box(table), Arc::new(SumProductAdapter), 1.0)
                    .expect("plan builds")
            })
        });
    }
    group.finish();
}

fn bench_planned_vs_naive(c: &mut Criterion) {
    let mut group = c.benchmark_group("whole_factor_update");
    for num_dims in [4usize, 6, 8] {
        let table = synthetic_table(num_dims, 4);
        let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0)
            .expect("plan builds");

        group.bench_function(BenchmarkId::new("planned", num_dims), |b| {
            let mut runtime = synthetic_runtime(&table);
            let mut scratch = plan.make_scratch();
            b.iter(|| plan.apply(&mut runtime, &mut scratch).expect("plan applies"))
        });
        group.bench_function(BenchmarkId::new("naive", num_dims), |b| {
            let mut runtime = synthetic_runtime(&table);
            b.iter(|| naive_update(&table, &mut runtime))
        });
    }
    group.finish();
}

fn bench_cost_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cost_estimation");
    for num_dims in [4usize, 8, 12] {
        let table = synthetic_table(num_dims, 3);
        group.bench_with_input(BenchmarkId::from_parameter(num_dims), &table, |b, table| {
            b.iter(|| estimate_optimized_costs(black_box(table), 1.0).expect("estimate runs"))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_plan_build,
    bench_planned_vs_naive,
    bench_cost_estimation
);
criterion_main!(benches);
