//! Concrete update plans: the decomposition driven against real tables.
//!
//! A [`FactorUpdatePlan`] is built once per factor table and is immutable
//! thereafter. It is an ordered list of steps over value buffers: the root
//! buffer is the table's own values, every auxiliary buffer lives in a
//! [`WorkerScratch`]. Scratch is created per worker from the plan and passed
//! explicitly into [`FactorUpdatePlan::apply`], so concurrent workers
//! replaying the same plan against different factor instances never share
//! mutable state, and repeated iterations reuse the same allocations.

use std::sync::Arc;

use crate::engine::errors::FactorPlanError;
use crate::engine::runtime::FactorRuntime;
use crate::engine::solver::SolverAdapter;
use crate::engine::table::{coords_from_joint, joint_from_coords, Dims, FactorTable, TableId};
use crate::engine::tree::{TreeBuilder, TreeWalker};

/// Where a step reads a table's values: the factor table itself (shared,
/// read-only) or a per-worker scratch slot.
#[derive(Debug, Clone)]
enum ValuesRef {
    Root(Arc<[f64]>),
    Slot(usize),
}

/// One node of the concrete decomposition: a real or auxiliary table.
#[derive(Clone)]
struct PlanNode {
    dims: Dims,
    /// Sorted joint indices of the stored entries; `None` when dense.
    pattern: Option<Arc<[u32]>>,
    values: ValuesRef,
}

/// The public shape of a plan step, for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Eliminates the dimension belonging to `edge`.
    Marginalize { edge: usize, sparse: bool },
    /// Writes the surviving one-dimensional table into `edge`'s message.
    Output { edge: usize, sparse: bool },
}

enum UpdateStep {
    DenseMarginalize {
        in_edge: usize,
        dim_size: usize,
        stride: usize,
        f: ValuesRef,
        g_slot: usize,
    },
    SparseMarginalize {
        in_edge: usize,
        msg_indices: Arc<[u32]>,
        g_indices: Arc<[u32]>,
        f: ValuesRef,
        g_slot: usize,
    },
    DenseOutput {
        out_edge: usize,
        f: ValuesRef,
    },
    SparseOutput {
        out_edge: usize,
        joint_indices: Arc<[u32]>,
        f: ValuesRef,
    },
}

impl UpdateStep {
    fn kind(&self) -> StepKind {
        match self {
            UpdateStep::DenseMarginalize { in_edge, .. } => StepKind::Marginalize {
                edge: *in_edge,
                sparse: false,
            },
            UpdateStep::SparseMarginalize { in_edge, .. } => StepKind::Marginalize {
                edge: *in_edge,
                sparse: true,
            },
            UpdateStep::DenseOutput { out_edge, .. } => StepKind::Output {
                edge: *out_edge,
                sparse: false,
            },
            UpdateStep::SparseOutput { out_edge, .. } => StepKind::Output {
                edge: *out_edge,
                sparse: true,
            },
        }
    }
}

/// Per-worker mutable buffers for a plan's auxiliary tables.
///
/// Created from the plan that will use it; reusable across any number of
/// applications of that plan, but only by one worker at a time.
pub struct WorkerScratch {
    table_id: TableId,
    buffers: Vec<Vec<f64>>,
}

impl WorkerScratch {
    fn resolve<'s>(&'s self, values: &'s ValuesRef) -> &'s [f64] {
        match values {
            ValuesRef::Root(v) => v,
            ValuesRef::Slot(i) => &self.buffers[*i],
        }
    }

    /// Borrows a step's input values and its output slot simultaneously.
    fn resolve_pair<'s>(
        &'s mut self,
        f: &'s ValuesRef,
        g_slot: usize,
    ) -> Result<(&'s [f64], &'s mut [f64]), FactorPlanError> {
        match f {
            ValuesRef::Root(v) => Ok((v, &mut self.buffers[g_slot])),
            ValuesRef::Slot(i) if *i < g_slot => {
                let (lo, hi) = self.buffers.split_at_mut(g_slot);
                Ok((&lo[*i], &mut hi[0]))
            }
            ValuesRef::Slot(i) if *i > g_slot => {
                let (lo, hi) = self.buffers.split_at_mut(*i);
                Ok((&hi[0], &mut lo[g_slot]))
            }
            ValuesRef::Slot(_) => Err(FactorPlanError::Internal(
                "marginalization step reads and writes the same scratch slot".into(),
            )),
        }
    }
}

/// The cached, immutable, ordered step sequence that computes all of a
/// table's per-edge marginals in one pass.
pub struct FactorUpdatePlan {
    table_id: TableId,
    steps: Vec<UpdateStep>,
    slot_sizes: Vec<usize>,
    adapter: Arc<dyn SolverAdapter>,
}

impl FactorUpdatePlan {
    /// Builds the plan for one factor table by running the shared
    /// decomposition in concrete mode. The same plan may be applied to any
    /// factor instance backed by the same table.
    pub fn build(
        table: &FactorTable,
        adapter: Arc<dyn SolverAdapter>,
        sparse_threshold: f64,
    ) -> Result<Self, FactorPlanError> {
        if !(0.0..=1.0).contains(&sparse_threshold) {
            return Err(FactorPlanError::InvalidOption(format!(
                "sparse threshold must be in [0, 1], got {}",
                sparse_threshold
            )));
        }
        // Step index arrays are u32; reject outright rather than truncate.
        if table.cardinality() > u32::MAX as usize {
            return Err(FactorPlanError::InvalidTable(format!(
                "table cardinality {} exceeds the plannable range",
                table.cardinality()
            )));
        }
        let n = table.num_dims();
        let capacity = n + n * (n.max(2) as f64).log2().ceil() as usize;
        let walker = TreeWalker::new(table.dims());
        let mut builder = PlanBuilder {
            table,
            adapter: adapter.as_ref(),
            sparse_threshold,
            steps: Vec::with_capacity(capacity),
            slot_sizes: Vec::new(),
        };
        walker.accept(&mut builder)?;
        Ok(Self {
            table_id: table.id(),
            steps: builder.steps,
            slot_sizes: builder.slot_sizes,
            adapter,
        })
    }

    /// The identity of the table this plan was built for.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// The shape of each step, in execution order.
    pub fn step_kinds(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.steps.iter().map(UpdateStep::kind)
    }

    /// Allocates scratch buffers for one worker. Reuse across iterations; do
    /// not share between workers.
    pub fn make_scratch(&self) -> WorkerScratch {
        WorkerScratch {
            table_id: self.table_id,
            buffers: self.slot_sizes.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    /// Recomputes every outgoing message of `runtime` by replaying the step
    /// sequence. The runtime and scratch must belong to this plan's table;
    /// anything else fails fast with [`FactorPlanError::PlanMismatch`].
    pub fn apply(
        &self,
        runtime: &mut FactorRuntime,
        scratch: &mut WorkerScratch,
    ) -> Result<(), FactorPlanError> {
        if runtime.table_id() != self.table_id {
            return Err(FactorPlanError::PlanMismatch(format!(
                "plan for table {:?} applied to a factor of table {:?}",
                self.table_id,
                runtime.table_id()
            )));
        }
        if scratch.table_id != self.table_id {
            return Err(FactorPlanError::PlanMismatch(format!(
                "plan for table {:?} given scratch for table {:?}",
                self.table_id, scratch.table_id
            )));
        }
        for step in &self.steps {
            match step {
                UpdateStep::DenseMarginalize {
                    in_edge,
                    dim_size,
                    stride,
                    f,
                    g_slot,
                } => {
                    let msg = runtime.in_message(*in_edge);
                    let (fv, gv) = scratch.resolve_pair(f, *g_slot)?;
                    self.adapter.marginalize_dense(fv, gv, msg, *dim_size, *stride);
                }
                UpdateStep::SparseMarginalize {
                    in_edge,
                    msg_indices,
                    g_indices,
                    f,
                    g_slot,
                } => {
                    let msg = runtime.in_message(*in_edge);
                    let (fv, gv) = scratch.resolve_pair(f, *g_slot)?;
                    self.adapter
                        .marginalize_sparse(fv, gv, msg, msg_indices, g_indices);
                }
                UpdateStep::DenseOutput { out_edge, f } => {
                    let fv = scratch.resolve(f);
                    self.adapter.finish_output(*out_edge, fv, None, runtime)?;
                }
                UpdateStep::SparseOutput {
                    out_edge,
                    joint_indices,
                    f,
                } => {
                    let fv = scratch.resolve(f);
                    self.adapter
                        .finish_output(*out_edge, fv, Some(joint_indices), runtime)?;
                }
            }
        }
        Ok(())
    }
}

struct PlanBuilder<'a> {
    table: &'a FactorTable,
    adapter: &'a dyn SolverAdapter,
    sparse_threshold: f64,
    steps: Vec<UpdateStep>,
    slot_sizes: Vec<usize>,
}

impl PlanBuilder<'_> {
    fn alloc_slot(&mut self, len: usize) -> usize {
        self.slot_sizes.push(len);
        self.slot_sizes.len() - 1
    }
}

impl TreeBuilder for PlanBuilder<'_> {
    type Node = PlanNode;

    fn root(&mut self) -> Result<Self::Node, FactorPlanError> {
        let values = self.adapter.root_values(self.table)?;
        let pattern = self
            .table
            .sparse_joint_indices()
            .map(|joint| Arc::from(joint.to_vec()));
        Ok(PlanNode {
            dims: Dims::from_slice(self.table.dims()),
            pattern,
            values: ValuesRef::Root(values),
        })
    }

    fn marginalize(
        &mut self,
        node: &Self::Node,
        edge: usize,
        local_dim: usize,
    ) -> Result<Self::Node, FactorPlanError> {
        let mut g_dims = node.dims.clone();
        g_dims.remove(local_dim);
        let g_cardinality: usize = g_dims.iter().product();

        if let Some(pattern) = &node.pattern {
            // Project every entry's coordinates into the child and record
            // which message value each entry folds in.
            let mut msg_indices = Vec::with_capacity(pattern.len());
            let mut child_joint = Vec::with_capacity(pattern.len());
            for &joint in pattern.iter() {
                let mut coords = coords_from_joint(&node.dims, joint as usize);
                msg_indices.push(coords[local_dim] as u32);
                coords.remove(local_dim);
                child_joint.push(joint_from_coords(&g_dims, &coords)? as u32);
            }
            let mut occupied = child_joint.clone();
            occupied.sort_unstable();
            occupied.dedup();

            let dense_child =
                occupied.len() as f64 >= g_cardinality as f64 * self.sparse_threshold;
            let (g_pattern, g_indices, g_len) = if dense_child {
                (None, child_joint, g_cardinality)
            } else {
                let positions = child_joint
                    .iter()
                    .map(|j| {
                        occupied
                            .binary_search(j)
                            .map(|p| p as u32)
                            .map_err(|_| {
                                FactorPlanError::Internal(
                                    "projected entry missing from child pattern".into(),
                                )
                            })
                    })
                    .collect::<Result<Vec<u32>, _>>()?;
                let len = occupied.len();
                (Some(Arc::from(occupied)), positions, len)
            };

            let g_slot = self.alloc_slot(g_len);
            let g = PlanNode {
                dims: g_dims,
                pattern: g_pattern,
                values: ValuesRef::Slot(g_slot),
            };
            self.steps.push(UpdateStep::SparseMarginalize {
                in_edge: edge,
                msg_indices: msg_indices.into(),
                g_indices: g_indices.into(),
                f: node.values.clone(),
                g_slot,
            });
            Ok(g)
        } else {
            // A dense parent has no sparsity pattern to inherit; the child is
            // always dense.
            let dim_size = node.dims[local_dim];
            let stride: usize = node.dims[..local_dim].iter().product();
            let g_slot = self.alloc_slot(g_cardinality);
            let g = PlanNode {
                dims: g_dims,
                pattern: None,
                values: ValuesRef::Slot(g_slot),
            };
            self.steps.push(UpdateStep::DenseMarginalize {
                in_edge: edge,
                dim_size,
                stride,
                f: node.values.clone(),
                g_slot,
            });
            Ok(g)
        }
    }

    fn output(&mut self, node: &Self::Node, edge: usize) -> Result<(), FactorPlanError> {
        let step = match &node.pattern {
            Some(pattern) => UpdateStep::SparseOutput {
                out_edge: edge,
                joint_indices: pattern.clone(),
                f: node.values.clone(),
            },
            None => UpdateStep::DenseOutput {
                out_edge: edge,
                f: node.values.clone(),
            },
        };
        self.steps.push(step);
        Ok(())
    }
}
