//! The tree decomposition that all update plans and cost estimates share.
//!
//! Given only a table's dimension sizes, the walker determines the minimal
//! step sequence that yields every edge's marginal while maximally sharing
//! intermediate tables. Dimensions are eliminated largest-first (eliminating
//! a large dimension shrinks the remaining table fastest), then a recursive
//! binary split carries each partially-marginalized table into both halves of
//! the remaining edge range. The base case, a range of one edge, emits an
//! output step for the one-dimensional table that survived the elimination
//! chain. Total work is O(N·log N) steps for N edges instead of the O(N²) of
//! marginalizing independently per edge.
//!
//! The traversal is generic over the node type, so the exact same step shape
//! is produced whether the nodes are concrete tables (plan construction) or
//! shape/density summaries (cost estimation).

use crate::engine::errors::FactorPlanError;

/// Callbacks driven by [`TreeWalker::accept`].
///
/// There are exactly two implementations: the concrete plan builder and the
/// cost-estimate builder. Nodes must be cheaply cloneable because an interior
/// table is shared by both halves of a split.
pub trait TreeBuilder {
    type Node: Clone;

    /// Produces the root node wrapping the factor table itself.
    fn root(&mut self) -> Result<Self::Node, FactorPlanError>;

    /// Eliminates one dimension of `node`, producing the child table.
    /// `edge` is the original edge index being eliminated; `local_dim` is that
    /// dimension's position among the dimensions still present in `node`.
    fn marginalize(
        &mut self,
        node: &Self::Node,
        edge: usize,
        local_dim: usize,
    ) -> Result<Self::Node, FactorPlanError>;

    /// Emits the terminal step for `edge`; `node` has exactly that edge's
    /// dimension left.
    fn output(&mut self, node: &Self::Node, edge: usize) -> Result<(), FactorPlanError>;
}

/// Deterministic elimination order for a dimension-size vector: indices sorted
/// by descending size, ties broken by original position.
pub fn elimination_order(dims: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dims.len()).collect();
    order.sort_by(|&a, &b| dims[b].cmp(&dims[a]).then(a.cmp(&b)));
    order
}

/// Drives a [`TreeBuilder`] through the shared decomposition of one table.
pub struct TreeWalker {
    order: Vec<usize>,
}

impl TreeWalker {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            order: elimination_order(dims),
        }
    }

    /// The elimination order this walker processes, earliest first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Runs the decomposition, invoking the builder's callbacks in step order.
    pub fn accept<B: TreeBuilder>(&self, builder: &mut B) -> Result<(), FactorPlanError> {
        if self.order.is_empty() {
            return Err(FactorPlanError::Internal(
                "decomposition of a zero-dimensional table".into(),
            ));
        }
        let root = builder.root()?;
        let remaining: Vec<usize> = (0..self.order.len()).collect();
        self.walk(0, self.order.len(), root, remaining, builder)
    }

    /// Processes the half-open range `[lo, hi)` of the elimination order.
    /// `node` still contains every dimension listed in `remaining` (original
    /// edge indices, ascending).
    fn walk<B: TreeBuilder>(
        &self,
        lo: usize,
        hi: usize,
        node: B::Node,
        remaining: Vec<usize>,
        builder: &mut B,
    ) -> Result<(), FactorPlanError> {
        if hi - lo == 1 {
            return builder.output(&node, self.order[lo]);
        }
        let mid = lo + (hi - lo) / 2;

        // Eliminate the first half's dimensions and carry the result into the
        // second half, then vice versa. Each half reuses the shared `node`.
        let mut left = node.clone();
        let mut left_remaining = remaining.clone();
        self.eliminate_range(lo, mid, &mut left, &mut left_remaining, builder)?;
        self.walk(mid, hi, left, left_remaining, builder)?;

        let mut right = node;
        let mut right_remaining = remaining;
        self.eliminate_range(mid, hi, &mut right, &mut right_remaining, builder)?;
        self.walk(lo, mid, right, right_remaining, builder)
    }

    fn eliminate_range<B: TreeBuilder>(
        &self,
        from: usize,
        to: usize,
        node: &mut B::Node,
        remaining: &mut Vec<usize>,
        builder: &mut B,
    ) -> Result<(), FactorPlanError> {
        for i in from..to {
            let edge = self.order[i];
            let local_dim = remaining.iter().position(|&e| e == edge).ok_or_else(|| {
                FactorPlanError::Internal(format!("edge {} already eliminated", edge))
            })?;
            *node = builder.marginalize(node, edge, local_dim)?;
            remaining.remove(local_dim);
        }
        Ok(())
    }
}
