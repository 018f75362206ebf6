//! Solver capability interface and the two concrete solvers.
//!
//! The decomposition and the plan are solver-agnostic; everything numeric is
//! supplied through [`SolverAdapter`]: how root values are read out of a
//! factor table, the four hot kernels a plan's steps execute, and the cost of
//! the naive per-edge update the optimizer compares against.
//!
//! [`SumProductAdapter`] works in weights (multiply/accumulate, normalized
//! outputs); [`MinSumAdapter`] works in energies (add/minimize, outputs
//! shifted so the minimum is zero).

use std::sync::Arc;

use crate::engine::costs::{CostKind, Costs};
use crate::engine::errors::FactorPlanError;
use crate::engine::runtime::FactorRuntime;
use crate::engine::table::FactorTable;

/// The numeric capabilities a solver supplies to the planner.
///
/// Implementations are stateless; one adapter instance serves every table and
/// every worker thread.
pub trait SolverAdapter: Send + Sync {
    /// Solver name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Extracts the root value array for a table: one value per joint index
    /// when dense, one per entry when sparse.
    fn root_values(&self, table: &FactorTable) -> Result<Arc<[f64]>, FactorPlanError>;

    /// Eliminates one dimension of a dense table `f` into the dense child `g`,
    /// folding in the eliminated edge's incoming message. `f` is laid out in
    /// joint-index order; the eliminated dimension has the given size and
    /// stride.
    fn marginalize_dense(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        dim_size: usize,
        stride: usize,
    );

    /// Eliminates one dimension of a sparse table `f` into `g` using the
    /// plan's precomputed index arrays: entry `n` of `f` reads
    /// `msg[msg_indices[n]]` and accumulates into `g[g_indices[n]]`.
    fn marginalize_sparse(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        msg_indices: &[u32],
        g_indices: &[u32],
    );

    /// Writes a one-dimensional table's values into the outgoing message for
    /// `edge`, applying the solver's normalization and any configured damping.
    /// `pattern` carries the joint indices of sparse values; `None` means the
    /// values are already in domain order.
    fn finish_output(
        &self,
        edge: usize,
        values: &[f64],
        pattern: Option<&[u32]>,
        runtime: &mut FactorRuntime,
    ) -> Result<(), FactorPlanError>;

    /// Projected costs of one naive whole-factor update: every edge's
    /// marginal computed independently by a full pass over the table.
    fn normal_update_costs(&self, table: &FactorTable) -> Costs;
}

/// Copies the previous output into the saved buffer when damping applies,
/// returning the damping factor to blend with (zero meaning none).
fn prepare_damping(out: &[f64], saved: &mut [f64], damping: f64, enabled: bool) -> f64 {
    if enabled && damping != 0.0 {
        saved.copy_from_slice(out);
        damping
    } else {
        0.0
    }
}

fn blend_damped(out: &mut [f64], saved: &[f64], damping: f64) {
    if damping != 0.0 {
        for (v, s) in out.iter_mut().zip(saved.iter()) {
            *v = (1.0 - damping) * *v + damping * s;
        }
    }
}

/// Sum-product: tables hold weights, messages are probabilities, outputs are
/// normalized to sum to one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumProductAdapter;

impl SolverAdapter for SumProductAdapter {
    fn name(&self) -> &'static str {
        "sum-product"
    }

    fn root_values(&self, table: &FactorTable) -> Result<Arc<[f64]>, FactorPlanError> {
        Ok(table.values().to_vec().into())
    }

    fn marginalize_dense(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        dim_size: usize,
        stride: usize,
    ) {
        g.fill(0.0);
        if f.is_empty() {
            return;
        }
        let mut base = 0;
        let mut msg_index = 0;
        let mut gi = 0;
        let mut limit = stride;
        let mut input = msg[0];
        for &value in f {
            g[gi] += value * input;
            gi += 1;
            if gi == limit {
                msg_index += 1;
                if msg_index == dim_size {
                    msg_index = 0;
                    base = limit;
                    limit += stride;
                }
                gi = base;
                input = msg[msg_index];
            }
        }
    }

    fn marginalize_sparse(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        msg_indices: &[u32],
        g_indices: &[u32],
    ) {
        g.fill(0.0);
        for ((&value, &mi), &gi) in f.iter().zip(msg_indices).zip(g_indices) {
            g[gi as usize] += value * msg[mi as usize];
        }
    }

    fn finish_output(
        &self,
        edge: usize,
        values: &[f64],
        pattern: Option<&[u32]>,
        runtime: &mut FactorRuntime,
    ) -> Result<(), FactorPlanError> {
        let damping = runtime.damping(edge);
        let enabled = runtime.damping_enabled();
        let (out, saved) = runtime.output_buffers_mut(edge);
        let damping = prepare_damping(out, saved, damping, enabled);

        match pattern {
            None => out.copy_from_slice(values),
            Some(joint) => {
                out.fill(0.0);
                for (&j, &value) in joint.iter().zip(values) {
                    out[j as usize] = value;
                }
            }
        }
        let sum: f64 = out.iter().sum();
        if sum == 0.0 {
            return Err(FactorPlanError::Numerical(format!(
                "all probabilities were zero computing the message for edge {}",
                edge
            )));
        }
        for v in out.iter_mut() {
            *v /= sum;
        }
        blend_damped(out, saved, damping);
        Ok(())
    }

    fn normal_update_costs(&self, table: &FactorTable) -> Costs {
        let mut costs = Costs::new();
        let entries = table.nonzero_count();
        if entries == 0 {
            return costs;
        }
        let ports = table.num_dims();
        let mut accesses = 0u64;
        for edge in 0..ports {
            let out_len = table.dims()[edge] as u64;
            // Clear the output, then read it to sum and rewrite it normalized.
            accesses += 3 * out_len;
            // Per entry: read its coordinates and its value.
            accesses += 2 * entries as u64;
            // Per entry and port: look up the input message, index into it,
            // multiply, and accumulate.
            accesses += 6 * entries as u64 * ports as u64;
        }
        costs.accrue(CostKind::Accesses, accesses as f64);
        costs
    }
}

/// Min-sum: tables hold energies (negative log weights), messages are
/// potentials, outputs are shifted so their minimum is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinSumAdapter;

impl SolverAdapter for MinSumAdapter {
    fn name(&self) -> &'static str {
        "min-sum"
    }

    fn root_values(&self, table: &FactorTable) -> Result<Arc<[f64]>, FactorPlanError> {
        let mut energies = Vec::with_capacity(table.values().len());
        for &weight in table.values() {
            if weight < 0.0 {
                return Err(FactorPlanError::InvalidTable(format!(
                    "negative weight {} has no energy representation",
                    weight
                )));
            }
            energies.push(-weight.ln());
        }
        Ok(energies.into())
    }

    fn marginalize_dense(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        dim_size: usize,
        stride: usize,
    ) {
        g.fill(f64::INFINITY);
        if f.is_empty() {
            return;
        }
        let mut base = 0;
        let mut msg_index = 0;
        let mut gi = 0;
        let mut limit = stride;
        let mut input = msg[0];
        for &value in f {
            let v = value + input;
            if v < g[gi] {
                g[gi] = v;
            }
            gi += 1;
            if gi == limit {
                msg_index += 1;
                if msg_index == dim_size {
                    msg_index = 0;
                    base = limit;
                    limit += stride;
                }
                gi = base;
                input = msg[msg_index];
            }
        }
    }

    fn marginalize_sparse(
        &self,
        f: &[f64],
        g: &mut [f64],
        msg: &[f64],
        msg_indices: &[u32],
        g_indices: &[u32],
    ) {
        g.fill(f64::INFINITY);
        for ((&value, &mi), &gi) in f.iter().zip(msg_indices).zip(g_indices) {
            let v = value + msg[mi as usize];
            if v < g[gi as usize] {
                g[gi as usize] = v;
            }
        }
    }

    fn finish_output(
        &self,
        edge: usize,
        values: &[f64],
        pattern: Option<&[u32]>,
        runtime: &mut FactorRuntime,
    ) -> Result<(), FactorPlanError> {
        let damping = runtime.damping(edge);
        let enabled = runtime.damping_enabled();
        let (out, saved) = runtime.output_buffers_mut(edge);
        let damping = prepare_damping(out, saved, damping, enabled);

        let mut min_potential = f64::INFINITY;
        match pattern {
            None => {
                for (o, &value) in out.iter_mut().zip(values) {
                    *o = value;
                    if value < min_potential {
                        min_potential = value;
                    }
                }
            }
            Some(joint) => {
                out.fill(f64::INFINITY);
                for (&j, &value) in joint.iter().zip(values) {
                    out[j as usize] = value;
                    if value < min_potential {
                        min_potential = value;
                    }
                }
            }
        }
        blend_damped(out, saved, damping);
        // A fully masked edge keeps infinite energies rather than NaN.
        if min_potential.is_finite() {
            for v in out.iter_mut() {
                *v -= min_potential;
            }
        }
        Ok(())
    }

    fn normal_update_costs(&self, table: &FactorTable) -> Costs {
        let mut costs = Costs::new();
        let entries = table.nonzero_count();
        if entries == 0 {
            return costs;
        }
        let ports = table.num_dims();
        let mut accesses = 0u64;
        for edge in 0..ports {
            let out_len = table.dims()[edge] as u64;
            // Fill the output with +infinity, scan it for the minimum, then
            // read and rewrite each value less the minimum.
            accesses += 4 * out_len;
            // Per entry: read its coordinates and its value.
            accesses += 2 * entries as u64;
            // Per entry and port: input and output message lookups, index
            // lookups, and the comparison reads.
            accesses += 8 * entries as u64 * ports as u64;
        }
        costs.accrue(CostKind::Accesses, accesses as f64);
        costs
    }
}
