//! Planned whole-factor updates against naive reference implementations.

use std::sync::Arc;

use factorplan_core::{
    FactorPlanError, FactorTable, FactorUpdatePlan, MinSumAdapter, SumProductAdapter,
};
use factorplan_tests::{
    assert_messages_close, min_sum_reference, runtime_with_messages, sum_product_reference,
};

fn dense_3d_table() -> FactorTable {
    let values: Vec<f64> = (0..24).map(|i| 0.5 + ((i * 11) % 7) as f64).collect();
    FactorTable::new_dense(&[2, 3, 4], values).unwrap()
}

fn messages_for(table: &FactorTable, seed: usize) -> Vec<Vec<f64>> {
    table
        .dims()
        .iter()
        .enumerate()
        .map(|(edge, &d)| {
            (0..d)
                .map(|i| 0.25 + ((seed + edge * 3 + i * 5) % 8) as f64 * 0.5)
                .collect()
        })
        .collect()
}

fn sparse_band_table() -> FactorTable {
    // A band pattern: entries where |x - y| <= 1, over a third dimension.
    let mut entries = Vec::new();
    for x in 0..4usize {
        for y in 0..4usize {
            if x.abs_diff(y) <= 1 {
                for z in 0..3usize {
                    entries.push((vec![x, y, z], 1.0 + (x + 2 * y + 3 * z) as f64));
                }
            }
        }
    }
    FactorTable::new_sparse(&[4, 4, 3], &entries).unwrap()
}

#[test]
fn dense_sum_product_matches_reference() {
    let table = dense_3d_table();
    let messages = messages_for(&table, 1);
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &messages);
    let mut scratch = plan.make_scratch();
    plan.apply(&mut runtime, &mut scratch).unwrap();

    let expected = sum_product_reference(&table, &messages);
    for edge in 0..table.num_dims() {
        assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
    }
}

#[test]
fn sparse_sum_product_matches_reference() {
    let table = sparse_band_table();
    let messages = messages_for(&table, 2);
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &messages);
    let mut scratch = plan.make_scratch();
    plan.apply(&mut runtime, &mut scratch).unwrap();

    let expected = sum_product_reference(&table, &messages);
    for edge in 0..table.num_dims() {
        assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
    }
}

#[test]
fn dense_min_sum_matches_reference() {
    let table = dense_3d_table();
    // Min-sum messages are energies; small non-negative values.
    let messages: Vec<Vec<f64>> = messages_for(&table, 3)
        .into_iter()
        .map(|msg| msg.into_iter().map(|v| v * 0.1).collect())
        .collect();
    let plan = FactorUpdatePlan::build(&table, Arc::new(MinSumAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &messages);
    let mut scratch = plan.make_scratch();
    plan.apply(&mut runtime, &mut scratch).unwrap();

    let expected = min_sum_reference(&table, &messages);
    for edge in 0..table.num_dims() {
        assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
    }
}

#[test]
fn sparse_min_sum_matches_reference() {
    let table = sparse_band_table();
    let messages: Vec<Vec<f64>> = messages_for(&table, 4)
        .into_iter()
        .map(|msg| msg.into_iter().map(|v| v * 0.2).collect())
        .collect();
    let plan = FactorUpdatePlan::build(&table, Arc::new(MinSumAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &messages);
    let mut scratch = plan.make_scratch();
    plan.apply(&mut runtime, &mut scratch).unwrap();

    let expected = min_sum_reference(&table, &messages);
    for edge in 0..table.num_dims() {
        assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
    }
}

#[test]
fn low_threshold_plans_agree_with_high_threshold_plans() {
    // Representation choices change the steps, never the results.
    let table = sparse_band_table();
    let messages = messages_for(&table, 5);
    let expected = sum_product_reference(&table, &messages);

    for threshold in [0.0, 0.4, 1.0] {
        let plan =
            FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), threshold).unwrap();
        let mut runtime = runtime_with_messages(&table, &messages);
        let mut scratch = plan.make_scratch();
        plan.apply(&mut runtime, &mut scratch).unwrap();
        for edge in 0..table.num_dims() {
            assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
        }
    }
}

#[test]
fn damping_blends_with_the_previous_output() {
    let table = dense_3d_table();
    let messages = messages_for(&table, 6);
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &messages);
    runtime.set_damping_enabled(true);
    runtime.set_damping(0, 0.5).unwrap();

    let reference = sum_product_reference(&table, &messages);
    let mut scratch = plan.make_scratch();

    // First application blends with the zeroed initial output.
    plan.apply(&mut runtime, &mut scratch).unwrap();
    let after_first: Vec<f64> = reference[0].iter().map(|v| 0.5 * v).collect();
    assert_messages_close(runtime.out_message(0), &after_first, 1e-12);
    // Undamped edges are unaffected.
    assert_messages_close(runtime.out_message(1), &reference[1], 1e-12);

    // Second application blends with the first result.
    plan.apply(&mut runtime, &mut scratch).unwrap();
    let after_second: Vec<f64> = reference[0]
        .iter()
        .zip(&after_first)
        .map(|(new, old)| 0.5 * new + 0.5 * old)
        .collect();
    assert_messages_close(runtime.out_message(0), &after_second, 1e-12);
}

#[test]
fn all_zero_marginal_is_a_numerical_error() {
    let table = FactorTable::new_dense(&[2, 2], vec![0.0; 4]).unwrap();
    let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();
    let mut runtime = runtime_with_messages(&table, &vec![vec![0.5, 0.5]; 2]);
    let mut scratch = plan.make_scratch();
    let err = plan.apply(&mut runtime, &mut scratch).unwrap_err();
    assert!(matches!(err, FactorPlanError::Numerical(_)));
}

#[test]
fn one_plan_serves_many_factor_instances() {
    let table = dense_3d_table();
    let plan = Arc::new(FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap());
    let mut scratch = plan.make_scratch();

    for seed in 0..5 {
        let messages = messages_for(&table, seed);
        let mut runtime = runtime_with_messages(&table, &messages);
        plan.apply(&mut runtime, &mut scratch).unwrap();
        let expected = sum_product_reference(&table, &messages);
        for edge in 0..table.num_dims() {
            assert_messages_close(runtime.out_message(edge), &expected[edge], 1e-12);
        }
    }
}
