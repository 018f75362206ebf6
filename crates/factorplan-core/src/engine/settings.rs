//! Update settings: which update approach a table uses and the knobs that
//! feed the automatic decision.
//!
//! Settings resolve in two layers. A store holds graph-wide defaults plus
//! sparse per-table overrides keyed by [`TableId`]; resolving a table merges
//! its overrides over the defaults, so a table only diverges in the fields
//! explicitly set for it. All setters validate eagerly and never clamp.

use rustc_hash::FxHashMap;

use crate::engine::errors::FactorPlanError;
use crate::engine::table::TableId;

/// How a factor table's whole-node updates are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateApproach {
    /// Always the naive per-edge update.
    Normal,
    /// Always the shared-plan update.
    Optimized,
    /// Choose per table by comparing projected costs.
    #[default]
    Automatic,
}

/// Resolved settings for one table's updates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateSettings {
    approach: UpdateApproach,
    sparse_threshold: f64,
    execution_time_weight: f64,
    memory_allocation_weight: f64,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            approach: UpdateApproach::Automatic,
            sparse_threshold: 1.0,
            execution_time_weight: 1.0,
            memory_allocation_weight: 10.0,
        }
    }
}

impl UpdateSettings {
    pub fn approach(&self) -> UpdateApproach {
        self.approach
    }

    pub fn set_approach(&mut self, approach: UpdateApproach) {
        self.approach = approach;
    }

    /// Density below which an auxiliary table is kept sparse, in [0, 1].
    pub fn sparse_threshold(&self) -> f64 {
        self.sparse_threshold
    }

    pub fn set_sparse_threshold(&mut self, threshold: f64) -> Result<(), FactorPlanError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FactorPlanError::InvalidOption(format!(
                "sparse threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        self.sparse_threshold = threshold;
        Ok(())
    }

    /// Weight on projected accesses in the automatic comparison.
    pub fn execution_time_weight(&self) -> f64 {
        self.execution_time_weight
    }

    pub fn set_execution_time_weight(&mut self, weight: f64) -> Result<(), FactorPlanError> {
        validate_weight("execution time weight", weight)?;
        self.execution_time_weight = weight;
        Ok(())
    }

    /// Weight on projected allocated bytes in the automatic comparison.
    pub fn memory_allocation_weight(&self) -> f64 {
        self.memory_allocation_weight
    }

    pub fn set_memory_allocation_weight(&mut self, weight: f64) -> Result<(), FactorPlanError> {
        validate_weight("memory allocation weight", weight)?;
        self.memory_allocation_weight = weight;
        Ok(())
    }
}

fn validate_weight(name: &str, weight: f64) -> Result<(), FactorPlanError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(FactorPlanError::InvalidOption(format!(
            "{} must be finite and non-negative, got {}",
            name, weight
        )));
    }
    Ok(())
}

/// Per-table overrides; `None` means "inherit the default".
#[derive(Debug, Clone, Copy, Default)]
struct SettingsOverride {
    approach: Option<UpdateApproach>,
    sparse_threshold: Option<f64>,
    execution_time_weight: Option<f64>,
    memory_allocation_weight: Option<f64>,
}

impl SettingsOverride {
    fn is_empty(&self) -> bool {
        self.approach.is_none()
            && self.sparse_threshold.is_none()
            && self.execution_time_weight.is_none()
            && self.memory_allocation_weight.is_none()
    }
}

/// Graph-wide defaults plus per-table overrides, with the automatic
/// decisions recorded by the optimizer.
#[derive(Debug, Default)]
pub struct UpdateSettingsStore {
    defaults: UpdateSettings,
    overrides: FxHashMap<TableId, SettingsOverride>,
    decisions: FxHashMap<TableId, bool>,
}

impl UpdateSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults(&self) -> &UpdateSettings {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut UpdateSettings {
        &mut self.defaults
    }

    /// The effective settings for a table: its overrides merged over the
    /// defaults.
    pub fn resolve(&self, table: TableId) -> UpdateSettings {
        let mut settings = self.defaults;
        if let Some(over) = self.overrides.get(&table) {
            if let Some(approach) = over.approach {
                settings.approach = approach;
            }
            if let Some(threshold) = over.sparse_threshold {
                settings.sparse_threshold = threshold;
            }
            if let Some(weight) = over.execution_time_weight {
                settings.execution_time_weight = weight;
            }
            if let Some(weight) = over.memory_allocation_weight {
                settings.memory_allocation_weight = weight;
            }
        }
        settings
    }

    pub fn set_table_approach(&mut self, table: TableId, approach: UpdateApproach) {
        self.overrides.entry(table).or_default().approach = Some(approach);
    }

    pub fn set_table_sparse_threshold(
        &mut self,
        table: TableId,
        threshold: f64,
    ) -> Result<(), FactorPlanError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FactorPlanError::InvalidOption(format!(
                "sparse threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        self.overrides.entry(table).or_default().sparse_threshold = Some(threshold);
        Ok(())
    }

    pub fn set_table_execution_time_weight(
        &mut self,
        table: TableId,
        weight: f64,
    ) -> Result<(), FactorPlanError> {
        validate_weight("execution time weight", weight)?;
        self.overrides.entry(table).or_default().execution_time_weight = Some(weight);
        Ok(())
    }

    pub fn set_table_memory_allocation_weight(
        &mut self,
        table: TableId,
        weight: f64,
    ) -> Result<(), FactorPlanError> {
        validate_weight("memory allocation weight", weight)?;
        self.overrides
            .entry(table)
            .or_default()
            .memory_allocation_weight = Some(weight);
        Ok(())
    }

    /// Drops a table's overrides, returning it to the defaults.
    pub fn clear_table(&mut self, table: TableId) {
        self.overrides.remove(&table);
        self.overrides.retain(|_, over| !over.is_empty());
    }

    /// Records the automatic choice made for a table during optimization.
    pub(crate) fn record_decision(&mut self, table: TableId, optimized: bool) {
        self.decisions.insert(table, optimized);
    }

    /// Whether the automatic mode chose the optimized update for a table.
    /// `None` until the optimizer has run over it.
    pub fn automatic_decision(&self, table: TableId) -> Option<bool> {
        self.decisions.get(&table).copied()
    }

    pub(crate) fn clear_decisions(&mut self) {
        self.decisions.clear();
    }
}
