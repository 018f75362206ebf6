//! Parallel plan application over many factor instances of one table.

use std::sync::Arc;

use factorplan_core::engine::parallel::apply_plan_parallel;
use factorplan_core::{FactorRuntime, FactorTable, FactorUpdatePlan, SumProductAdapter};
use factorplan_tests::{assert_messages_close, runtime_with_messages, sum_product_reference};

fn banded_table() -> FactorTable {
    let values: Vec<f64> = (0..60).map(|i| 0.5 + ((i * 13) % 11) as f64).collect();
    FactorTable::new_dense(&[3, 4, 5], values).unwrap()
}

fn messages_for(table: &FactorTable, seed: usize) -> Vec<Vec<f64>> {
    table
        .dims()
        .iter()
        .enumerate()
        .map(|(edge, &d)| {
            (0..d)
                .map(|i| 0.5 + ((seed * 7 + edge + i * 3) % 9) as f64 * 0.25)
                .collect()
        })
        .collect()
}

#[test]
fn parallel_updates_match_the_reference_per_instance() {
    let table = banded_table();
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();

    let all_messages: Vec<Vec<Vec<f64>>> = (0..64).map(|seed| messages_for(&table, seed)).collect();
    let mut runtimes: Vec<FactorRuntime> = all_messages
        .iter()
        .map(|messages| runtime_with_messages(&table, messages))
        .collect();

    apply_plan_parallel(&plan, &mut runtimes).unwrap();

    for (runtime, messages) in runtimes.iter().zip(&all_messages) {
        let expected = sum_product_reference(&table, messages);
        for edge in 0..table.num_dims() {
            assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
        }
    }
}

#[test]
fn a_foreign_runtime_fails_the_whole_pass() {
    let table = banded_table();
    let other = banded_table();
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();

    let mut runtimes: Vec<FactorRuntime> = (0..8)
        .map(|seed| runtime_with_messages(&table, &messages_for(&table, seed)))
        .collect();
    runtimes.push(FactorRuntime::for_table(&other));

    assert!(apply_plan_parallel(&plan, &mut runtimes).is_err());
}
