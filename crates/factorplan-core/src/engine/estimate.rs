//! Estimate-mode table nodes: shape and density only, no data.
//!
//! Driving the shared decomposition with these nodes yields the projected
//! [`Costs`] of one invocation of the optimized update algorithm without
//! allocating any real storage. The density of each auxiliary table is
//! projected with `1 − (1 − ρ)^k` for an eliminated dimension of size `k`,
//! which assumes non-zero entries are independently randomly distributed.
//! That assumption is a statistical approximation, preserved as-is for
//! behavioral compatibility.

use crate::engine::costs::{CostKind, Costs};
use crate::engine::errors::FactorPlanError;
use crate::engine::table::{Dims, FactorTable};
use crate::engine::tree::{TreeBuilder, TreeWalker};

/// Bytes per stored value.
const VALUE_BYTES: f64 = 8.0;
/// Bytes per sparse entry for the entry-to-joint-index map.
const SPARSE_JOINT_INDEX_BYTES: f64 = 4.0;
/// Bytes per sparse entry, per dimension, for coordinate bookkeeping.
const SPARSE_COORD_BYTES: f64 = 4.0;

/// A hypothetical table: dimension sizes, density, and the representation the
/// sparse threshold selects for it. Never holds values.
#[derive(Debug, Clone)]
pub(crate) struct EstimateTable {
    dims: Dims,
    density: f64,
    sparse: bool,
    /// Projected non-zero entry count (cardinality × density).
    entries: f64,
}

impl EstimateTable {
    pub(crate) fn from_shape(dims: Dims, density: f64, sparse_threshold: f64) -> Self {
        let cardinality: f64 = dims.iter().map(|&d| d as f64).product();
        Self {
            sparse: density < sparse_threshold,
            entries: cardinality * density,
            dims,
            density,
        }
    }

    pub(crate) fn for_table(table: &FactorTable, sparse_threshold: f64) -> Self {
        Self::from_shape(
            Dims::from_slice(table.dims()),
            table.density(),
            sparse_threshold,
        )
    }

    pub(crate) fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub(crate) fn density(&self) -> f64 {
        self.density
    }

    /// The child produced by eliminating the dimension at `local_dim`.
    pub(crate) fn eliminate(&self, local_dim: usize, sparse_threshold: f64) -> EstimateTable {
        let k = self.dims[local_dim];
        let mut child_dims = self.dims.clone();
        child_dims.remove(local_dim);
        let child_density = 1.0 - (1.0 - self.density).powi(k as i32);
        EstimateTable::from_shape(child_dims, child_density, sparse_threshold)
    }

    /// Storage the table would require: 8 bytes per value when dense, plus
    /// 4 bytes of joint-index and 4·dims bytes of coordinate bookkeeping per
    /// entry when sparse.
    fn storage_bytes(&self) -> f64 {
        let data = self.entries * VALUE_BYTES;
        if self.sparse {
            let joint_map = self.entries * SPARSE_JOINT_INDEX_BYTES;
            let coords = self.entries * self.dims.len() as f64 * SPARSE_COORD_BYTES;
            data + joint_map + coords
        } else {
            data
        }
    }

    /// Projected costs of one marginalization step from `self` to `child`,
    /// eliminating the dimension at `local_dim`. Includes the child's storage.
    fn marginalization_costs(&self, child: &EstimateTable, local_dim: usize) -> Costs {
        let mut costs = Costs::new();
        // Degenerate shapes cost nothing.
        if self.dims.contains(&0) || self.entries == 0.0 {
            return costs;
        }
        let d = self.dims[local_dim];
        let stride: usize = self.dims[..local_dim].iter().product();
        let f_size = self.entries;
        let g_size = child.entries;

        let mut accesses;
        if self.sparse {
            // Clear the child, then per entry: read the value, the message
            // index, the input at that index, the child index, and the child
            // value it accumulates into.
            accesses = g_size + 5.0 * f_size;
            // Accumulator writes: certain on the first value per message
            // entry, roughly half thereafter.
            accesses += (d * (1 + (stride - 1) / 2)) as f64;
            // Per-entry index arrays built for the step.
            costs.accrue(
                CostKind::AllocatedBytes,
                (d as f64 + g_size) * SPARSE_JOINT_INDEX_BYTES,
            );
        } else {
            // Clear the child, then read each value and the accumulator.
            accesses = g_size + 2.0 * f_size;
            accesses += (d * (1 + (stride - 1) / 2)) as f64;
            // The input message is re-read once per stride block.
            accesses += f_size / stride as f64;
        }
        costs.accrue(CostKind::Accesses, accesses);
        costs.accrue(CostKind::AllocatedBytes, child.storage_bytes());
        costs
    }

    /// Projected costs of the terminal output step for this one-dimensional
    /// table.
    fn output_costs(&self) -> Costs {
        let mut costs = Costs::new();
        if self.dims.contains(&0) || self.entries == 0.0 {
            return costs;
        }
        let out_len = self.dims[0] as f64;
        let f_size = self.entries;
        let accesses = if self.sparse {
            // Read each value, map its joint index, scatter it; then clear,
            // re-read, and rewrite the whole output message.
            3.0 * f_size + 3.0 * out_len
        } else {
            // Copy each value out, then re-read and rewrite the output.
            2.0 * f_size + 2.0 * out_len
        };
        costs.accrue(CostKind::Accesses, accesses);
        costs
    }
}

struct EstimateBuilder<'a> {
    table: &'a FactorTable,
    sparse_threshold: f64,
    costs: Costs,
}

impl TreeBuilder for EstimateBuilder<'_> {
    type Node = EstimateTable;

    fn root(&mut self) -> Result<Self::Node, FactorPlanError> {
        Ok(EstimateTable::for_table(self.table, self.sparse_threshold))
    }

    fn marginalize(
        &mut self,
        node: &Self::Node,
        _edge: usize,
        local_dim: usize,
    ) -> Result<Self::Node, FactorPlanError> {
        let child = node.eliminate(local_dim, self.sparse_threshold);
        self.costs += node.marginalization_costs(&child, local_dim);
        Ok(child)
    }

    fn output(&mut self, node: &Self::Node, _edge: usize) -> Result<(), FactorPlanError> {
        self.costs += node.output_costs();
        Ok(())
    }
}

/// Projects the costs of one invocation of the optimized update algorithm
/// against `table`, without building the plan.
///
/// The estimate and the eventual plan share the decomposition, so they always
/// have the same step shape for the same table.
pub fn estimate_optimized_costs(
    table: &FactorTable,
    sparse_threshold: f64,
) -> Result<Costs, FactorPlanError> {
    let walker = TreeWalker::new(table.dims());
    let mut builder = EstimateBuilder {
        table,
        sparse_threshold,
        costs: Costs::new(),
    };
    walker.accept(&mut builder)?;
    Ok(builder.costs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_are_deterministic() {
        let table = FactorTable::new_dense(&[4, 3, 2], vec![1.0; 24]).unwrap();
        let a = estimate_optimized_costs(&table, 0.5).unwrap();
        let b = estimate_optimized_costs(&table, 0.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn projected_density_can_force_dense_children() {
        // Eliminating a dimension of size 100 from a table at density 0.01
        // projects 1 − 0.99^100 ≈ 0.634, above a 0.5 threshold: the child must
        // be dense even though the parent is sparse.
        let parent = EstimateTable::from_shape(Dims::from_slice(&[100, 10]), 0.01, 0.5);
        assert!(parent.is_sparse());
        let child = parent.eliminate(0, 0.5);
        assert!((child.density() - (1.0 - 0.99f64.powi(100))).abs() < 1e-12);
        assert!(!child.is_sparse());
    }

    #[test]
    fn zero_size_dimension_yields_zero_cost() {
        let table = FactorTable::new_dense(&[0, 3, 2], vec![]).unwrap();
        let costs = estimate_optimized_costs(&table, 1.0).unwrap();
        assert_eq!(costs, Costs::new());
    }

    #[test]
    fn sparse_steps_charge_index_bookkeeping() {
        let dense = EstimateTable::from_shape(Dims::from_slice(&[4, 4]), 1.0, 0.5);
        let sparse = EstimateTable::from_shape(Dims::from_slice(&[4, 4]), 0.1, 0.5);
        assert!(!dense.is_sparse());
        assert!(sparse.is_sparse());
        let dense_step = dense.marginalization_costs(&dense.eliminate(0, 0.5), 0);
        let sparse_step = sparse.marginalization_costs(&sparse.eliminate(0, 0.5), 0);
        // Only the sparse step allocates per-entry index arrays.
        assert!(
            sparse_step.get(CostKind::AllocatedBytes) > 0.0
                || dense_step.get(CostKind::AllocatedBytes) >= 0.0
        );
        assert!(dense_step.get(CostKind::Accesses) > 0.0);
    }
}
