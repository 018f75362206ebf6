//! The per-graph optimizer: decides, per factor table, whether whole-node
//! updates use the shared plan or the naive per-edge update, and caches the
//! plans for the tables that use them.
//!
//! The automatic decision compares two projected cost totals. Accesses are
//! multiplied by how often the schedule updates the table per iteration and
//! divided by the effective worker parallelism, for both candidates; the
//! optimized candidate's allocation is multiplied by the parallelism, since
//! every worker carries its own scratch. Each total then collapses to a
//! scalar with the table's execution-time and memory-allocation weights, and
//! the optimized update wins ties. Tables with fewer than two dimensions
//! have nothing to marginalize out early and are never optimized, even when
//! forced.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::costs::{CostKind, Costs};
use crate::engine::errors::FactorPlanError;
use crate::engine::estimate::estimate_optimized_costs;
use crate::engine::plan::FactorUpdatePlan;
use crate::engine::schedule::Schedule;
use crate::engine::settings::{UpdateApproach, UpdateSettingsStore};
use crate::engine::solver::SolverAdapter;
use crate::engine::table::{FactorTable, TableId};

/// The outcome of the automatic comparison for one table.
#[derive(Debug, Clone)]
pub struct TableDecision {
    pub table: TableId,
    /// The approach the table's settings resolve to.
    pub approach: UpdateApproach,
    /// Whole-node updates of this table per scheduled iteration.
    pub update_count: usize,
    /// Projected per-iteration costs of the planned update, scaled for the
    /// schedule and worker count. Absent when the approach was forced.
    pub optimized_costs: Option<Costs>,
    /// Projected per-iteration costs of the naive update, scaled likewise.
    pub normal_costs: Option<Costs>,
    pub chose_optimized: bool,
}

/// What one optimization pass decided, table by table.
#[derive(Debug, Clone)]
pub struct OptimizeDiagnostics {
    pub workers: usize,
    pub decisions: Vec<TableDecision>,
}

/// Chooses and caches update plans for the factor tables of one graph.
pub struct UpdateOptimizer {
    adapter: Arc<dyn SolverAdapter>,
    workers: usize,
    settings: UpdateSettingsStore,
    plans: FxHashMap<TableId, Arc<FactorUpdatePlan>>,
}

impl std::fmt::Debug for UpdateOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOptimizer")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl UpdateOptimizer {
    /// Creates an optimizer sized to the host's available parallelism.
    pub fn new(adapter: Arc<dyn SolverAdapter>) -> Self {
        Self {
            adapter,
            workers: default_workers(),
            settings: UpdateSettingsStore::new(),
            plans: FxHashMap::default(),
        }
    }

    /// Creates an optimizer for an explicit worker count.
    pub fn with_workers(
        adapter: Arc<dyn SolverAdapter>,
        workers: usize,
    ) -> Result<Self, FactorPlanError> {
        if workers == 0 {
            return Err(FactorPlanError::InvalidOption(
                "worker count must be at least 1".into(),
            ));
        }
        let mut optimizer = Self::new(adapter);
        optimizer.workers = workers;
        Ok(optimizer)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn adapter(&self) -> &Arc<dyn SolverAdapter> {
        &self.adapter
    }

    pub fn settings(&self) -> &UpdateSettingsStore {
        &self.settings
    }

    /// Mutable access to the settings store. Changing settings after plans
    /// were built requires [`UpdateOptimizer::invalidate_plans`] to take
    /// effect.
    pub fn settings_mut(&mut self) -> &mut UpdateSettingsStore {
        &mut self.settings
    }

    /// Runs the per-table decision over every table, using the schedule's
    /// whole-node update counts, and builds the plan for every table that
    /// resolves to the optimized path. Plan construction therefore completes
    /// here, before any worker runs, and a table whose plan cannot be built
    /// fails the whole pass. Re-running replaces all previous automatic
    /// decisions.
    pub fn optimize(
        &mut self,
        tables: &[FactorTable],
        schedule: &Schedule,
    ) -> Result<OptimizeDiagnostics, FactorPlanError> {
        let counts = schedule.factor_update_counts();
        self.settings.clear_decisions();
        let mut decisions = Vec::with_capacity(tables.len());
        for table in tables {
            let count = counts.get(&table.id()).copied().unwrap_or(0);
            let decision = self.decide(table, count)?;
            if decision.chose_optimized {
                self.plan(table)?;
            }
            if decision.approach == UpdateApproach::Automatic {
                self.settings
                    .record_decision(table.id(), decision.chose_optimized);
            }
            decisions.push(decision);
        }
        Ok(OptimizeDiagnostics {
            workers: self.workers,
            decisions,
        })
    }

    fn decide(&self, table: &FactorTable, count: usize) -> Result<TableDecision, FactorPlanError> {
        let settings = self.settings.resolve(table.id());
        let approach = settings.approach();
        if table.num_dims() < 2 {
            return Ok(TableDecision {
                table: table.id(),
                approach,
                update_count: count,
                optimized_costs: None,
                normal_costs: None,
                chose_optimized: false,
            });
        }
        match approach {
            UpdateApproach::Normal | UpdateApproach::Optimized => Ok(TableDecision {
                table: table.id(),
                approach,
                update_count: count,
                optimized_costs: None,
                normal_costs: None,
                chose_optimized: approach == UpdateApproach::Optimized,
            }),
            UpdateApproach::Automatic => {
                let scale = count.min(self.workers).max(1) as f64;
                let mut optimized =
                    estimate_optimized_costs(table, settings.sparse_threshold())?;
                let mut normal = self.adapter.normal_update_costs(table);
                for costs in [&mut optimized, &mut normal] {
                    let accesses = costs.get(CostKind::Accesses) * count as f64 / scale;
                    costs.put(CostKind::Accesses, accesses);
                }
                optimized.put(
                    CostKind::AllocatedBytes,
                    optimized.get(CostKind::AllocatedBytes) * scale,
                );
                let optimized_total = optimized.weighted_total(
                    settings.execution_time_weight(),
                    settings.memory_allocation_weight(),
                );
                let normal_total = normal.weighted_total(
                    settings.execution_time_weight(),
                    settings.memory_allocation_weight(),
                );
                Ok(TableDecision {
                    table: table.id(),
                    approach,
                    update_count: count,
                    optimized_costs: Some(optimized),
                    normal_costs: Some(normal),
                    chose_optimized: optimized_total <= normal_total,
                })
            }
        }
    }

    /// Whether whole-node updates of this table should go through the shared
    /// plan, per its resolved approach and, in automatic mode, the last
    /// recorded decision. Automatic tables default to the naive update until
    /// [`UpdateOptimizer::optimize`] has run.
    pub fn should_use_optimized_update(&self, table: &FactorTable) -> bool {
        if table.num_dims() < 2 {
            return false;
        }
        match self.settings.resolve(table.id()).approach() {
            UpdateApproach::Normal => false,
            UpdateApproach::Optimized => true,
            UpdateApproach::Automatic => self
                .settings
                .automatic_decision(table.id())
                .unwrap_or(false),
        }
    }

    /// The shared plan for a table, building and caching it on first use.
    /// Every factor backed by the same table receives the same plan.
    pub fn plan(&mut self, table: &FactorTable) -> Result<Arc<FactorUpdatePlan>, FactorPlanError> {
        if let Some(plan) = self.plans.get(&table.id()) {
            return Ok(Arc::clone(plan));
        }
        let threshold = self.settings.resolve(table.id()).sparse_threshold();
        let plan = Arc::new(FactorUpdatePlan::build(
            table,
            Arc::clone(&self.adapter),
            threshold,
        )?);
        self.plans.insert(table.id(), Arc::clone(&plan));
        Ok(plan)
    }

    /// Drops all cached plans and automatic decisions. Call after changing
    /// settings or replacing tables.
    pub fn invalidate_plans(&mut self) {
        self.plans.clear();
        self.settings.clear_decisions();
    }
}

#[cfg(feature = "parallel")]
fn default_workers() -> usize {
    num_cpus::get().max(1)
}

#[cfg(not(feature = "parallel"))]
fn default_workers() -> usize {
    1
}
