//! # Factorplan Core
//!
//! Planned whole-factor updates for discrete factor graphs.
//!
//! When belief propagation updates every outgoing edge of a factor at once,
//! the naive approach marginalizes the full joint table once per edge. This
//! crate instead builds a shared tree decomposition per factor table that
//! reuses partial marginalizations across edges, caches it as an immutable
//! plan, and decides per table, by projected cost, whether the plan beats
//! the naive update on the current schedule.

#![forbid(unsafe_code)]

pub mod engine;

// Re-export commonly used types
pub use engine::costs::{CostKind, Costs};
pub use engine::errors::FactorPlanError;
pub use engine::optimizer::{OptimizeDiagnostics, TableDecision, UpdateOptimizer};
pub use engine::plan::{FactorUpdatePlan, StepKind, WorkerScratch};
pub use engine::runtime::FactorRuntime;
pub use engine::schedule::{Schedule, ScheduleEntry};
pub use engine::settings::{UpdateApproach, UpdateSettings, UpdateSettingsStore};
pub use engine::solver::{MinSumAdapter, SolverAdapter, SumProductAdapter};
pub use engine::table::{FactorTable, TableId, TableStorage};
