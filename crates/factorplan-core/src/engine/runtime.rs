//! Per-factor runtime state consumed by the concrete update steps.
//!
//! One `FactorRuntime` exists per factor instance. Factors sharing a table
//! share a plan, but each owns its own message buffers, damping settings, and
//! saved-output storage. The planner never touches this state; only the
//! solver kernels do, during plan application.

use crate::engine::errors::FactorPlanError;
use crate::engine::table::{FactorTable, TableId};

/// Message buffers and damping configuration for one factor instance.
#[derive(Debug, Clone)]
pub struct FactorRuntime {
    table_id: TableId,
    in_messages: Vec<Vec<f64>>,
    out_messages: Vec<Vec<f64>>,
    saved_out: Vec<Vec<f64>>,
    damping: Vec<f64>,
    damping_enabled: bool,
}

impl FactorRuntime {
    /// Creates runtime state sized for `table`: one input and one output
    /// message per edge, each as long as the edge's domain. Messages start at
    /// zero; callers set inputs before applying a plan.
    pub fn for_table(table: &FactorTable) -> Self {
        let buffers = || table.dims().iter().map(|&d| vec![0.0; d]).collect();
        Self {
            table_id: table.id(),
            in_messages: buffers(),
            out_messages: buffers(),
            saved_out: buffers(),
            damping: vec![0.0; table.num_dims()],
            damping_enabled: false,
        }
    }

    /// The identity of the table this runtime belongs to.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn num_edges(&self) -> usize {
        self.in_messages.len()
    }

    pub fn in_message(&self, edge: usize) -> &[f64] {
        &self.in_messages[edge]
    }

    pub fn out_message(&self, edge: usize) -> &[f64] {
        &self.out_messages[edge]
    }

    /// Replaces the incoming message on `edge`; the length must match the
    /// edge's domain size.
    pub fn set_in_message(&mut self, edge: usize, values: &[f64]) -> Result<(), FactorPlanError> {
        let slot = self
            .in_messages
            .get_mut(edge)
            .ok_or_else(|| FactorPlanError::PlanMismatch(format!("no edge {}", edge)))?;
        if slot.len() != values.len() {
            return Err(FactorPlanError::PlanMismatch(format!(
                "message of length {} for edge {} with domain size {}",
                values.len(),
                edge,
                slot.len()
            )));
        }
        slot.copy_from_slice(values);
        Ok(())
    }

    /// Sets the damping factor for one outgoing edge; must lie in [0, 1).
    pub fn set_damping(&mut self, edge: usize, damping: f64) -> Result<(), FactorPlanError> {
        if !(0.0..1.0).contains(&damping) {
            return Err(FactorPlanError::InvalidOption(format!(
                "damping must be in [0, 1), got {}",
                damping
            )));
        }
        let slot = self
            .damping
            .get_mut(edge)
            .ok_or_else(|| FactorPlanError::PlanMismatch(format!("no edge {}", edge)))?;
        *slot = damping;
        Ok(())
    }

    pub fn set_damping_enabled(&mut self, enabled: bool) {
        self.damping_enabled = enabled;
    }

    pub fn damping_enabled(&self) -> bool {
        self.damping_enabled
    }

    pub fn damping(&self, edge: usize) -> f64 {
        self.damping[edge]
    }

    /// The output message and its saved previous value, for damped updates.
    pub(crate) fn output_buffers_mut(&mut self, edge: usize) -> (&mut [f64], &mut [f64]) {
        (&mut self.out_messages[edge], &mut self.saved_out[edge])
    }
}
