//! Error types for plan construction, cost optimization, and plan application.

use thiserror::Error;

/// Errors surfaced by the factor-update planning engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking changes. All public APIs return `Result<T, FactorPlanError>`
/// to avoid panics in library code.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FactorPlanError {
    /// An option value outside its legal range (e.g. a sparse threshold not in
    /// [0, 1], or a negative scaling weight). Rejected eagerly, never clamped.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A malformed factor table: no dimensions, entry/shape mismatch, or a
    /// cardinality too large for the plan's index arrays.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// A plan applied against runtime state that does not belong to the table
    /// the plan was built for. Caller error; fails fast rather than computing
    /// garbage.
    #[error("plan mismatch: {0}")]
    PlanMismatch(String),

    /// Numerical failure during plan application (e.g. an all-zero output
    /// message in the sum-product solver).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal invariant violation (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
