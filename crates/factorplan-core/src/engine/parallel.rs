//! Parallel plan application over many factor instances.
//!
//! A plan is immutable and shared; only the runtimes and scratch are
//! per-worker. Rayon's `for_each_init` gives each worker one scratch
//! allocation for its whole run, so buffers are reused across the factors a
//! worker processes rather than reallocated per factor.

use rayon::prelude::*;

use crate::engine::errors::FactorPlanError;
use crate::engine::plan::FactorUpdatePlan;
use crate::engine::runtime::FactorRuntime;

/// Applies one shared plan to every runtime in parallel. All runtimes must
/// belong to the plan's table; the first mismatch aborts the pass.
pub fn apply_plan_parallel(
    plan: &FactorUpdatePlan,
    runtimes: &mut [FactorRuntime],
) -> Result<(), FactorPlanError> {
    runtimes
        .par_iter_mut()
        .try_for_each_init(|| plan.make_scratch(), |scratch, runtime| plan.apply(runtime, scratch))
}

/// The worker count the host offers for plan application.
pub fn available_workers() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::solver::SumProductAdapter;
    use crate::engine::table::FactorTable;

    #[test]
    fn parallel_application_matches_sequential() {
        let table = FactorTable::new_dense(
            &[3, 4, 2],
            (0..24).map(|i| 1.0 + i as f64).collect(),
        )
        .unwrap();
        let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();

        let make_runtime = |seed: usize| {
            let mut runtime = FactorRuntime::for_table(&table);
            for edge in 0..table.num_dims() {
                let d = table.dims()[edge];
                let msg: Vec<f64> = (0..d).map(|i| 1.0 + ((seed + i) % 5) as f64).collect();
                runtime.set_in_message(edge, &msg).unwrap();
            }
            runtime
        };

        let mut sequential: Vec<FactorRuntime> = (0..16).map(make_runtime).collect();
        let mut scratch = plan.make_scratch();
        for runtime in &mut sequential {
            plan.apply(runtime, &mut scratch).unwrap();
        }

        let mut parallel: Vec<FactorRuntime> = (0..16).map(make_runtime).collect();
        apply_plan_parallel(&plan, &mut parallel).unwrap();

        for (s, p) in sequential.iter().zip(&parallel) {
            for edge in 0..table.num_dims() {
                assert_eq!(s.out_message(edge), p.out_message(edge));
            }
        }
    }

    #[test]
    fn mismatched_runtime_aborts_the_pass() {
        let table = FactorTable::new_dense(&[2, 2], vec![1.0; 4]).unwrap();
        let other = FactorTable::new_dense(&[2, 2], vec![1.0; 4]).unwrap();
        let plan = FactorUpdatePlan::build(&table, Arc::new(SumProductAdapter), 1.0).unwrap();

        let mut runtimes = vec![FactorRuntime::for_table(&other)];
        assert!(apply_plan_parallel(&plan, &mut runtimes).is_err());
    }
}
