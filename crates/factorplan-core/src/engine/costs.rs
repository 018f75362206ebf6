//! Typed cost accounting for update-approach selection.
//!
//! Costs are a small closed set of named quantities with additive combination.
//! `Accesses` is a proxy for execution time (array reads and writes performed
//! by one invocation of an update algorithm); `AllocatedBytes` counts the
//! auxiliary storage an invocation requires. Absent kinds read as zero.

use std::ops::{Add, AddAssign};

/// The closed set of cost kinds tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CostKind {
    /// Array reads and writes; a proxy for execution time.
    Accesses,
    /// Auxiliary bytes allocated per concurrent invocation.
    AllocatedBytes,
}

const COST_KINDS: usize = 2;

/// An additive bag of named, non-negative cost amounts.
///
/// Created empty and only ever grows; absent kinds read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Costs {
    amounts: [f64; COST_KINDS],
}

impl Costs {
    /// Creates an empty cost bag; every kind reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the amount recorded for `kind`, or zero if never set.
    pub fn get(&self, kind: CostKind) -> f64 {
        self.amounts[kind as usize]
    }

    /// Replaces the amount recorded for `kind`.
    pub fn put(&mut self, kind: CostKind, amount: f64) {
        debug_assert!(amount >= 0.0, "cost amounts are non-negative");
        self.amounts[kind as usize] = amount;
    }

    /// Adds `amount` to the amount recorded for `kind`.
    pub fn accrue(&mut self, kind: CostKind, amount: f64) {
        debug_assert!(amount >= 0.0, "cost amounts are non-negative");
        self.amounts[kind as usize] += amount;
    }

    /// Collapses the bag to a single comparable scalar using the per-table
    /// tunable weights: `accesses * time_weight + bytes * memory_weight`.
    pub fn weighted_total(&self, time_weight: f64, memory_weight: f64) -> f64 {
        self.get(CostKind::Accesses) * time_weight
            + self.get(CostKind::AllocatedBytes) * memory_weight
    }
}

impl Add for Costs {
    type Output = Costs;

    fn add(self, rhs: Costs) -> Costs {
        let mut out = self;
        out += rhs;
        out
    }
}

impl AddAssign for Costs {
    fn add_assign(&mut self, rhs: Costs) {
        for (a, b) in self.amounts.iter_mut().zip(rhs.amounts.iter()) {
            *a += b;
        }
    }
}
