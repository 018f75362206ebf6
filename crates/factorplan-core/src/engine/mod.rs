//! The planning and execution engine for optimized factor updates.
//!
//! This module provides:
//! - **errors**: Error types for planning and execution failures
//! - **costs**: The two-kind cost vocabulary the optimizer compares
//! - **table**: Dense and sparse factor tables with joint indexing
//! - **tree**: The shared tree decomposition behind plans and estimates
//! - **estimate**: Symbolic cost estimation without building real buffers
//! - **solver**: Solver adapters (sum-product, min-sum) behind one trait
//! - **runtime**: Per-factor message buffers and damping state
//! - **plan**: Concrete update plans and per-worker scratch
//! - **settings**: Per-table update settings layered over defaults
//! - **schedule**: Update schedules and whole-node update counting
//! - **optimizer**: The per-graph approach decision and plan cache

pub mod costs;
pub mod errors;
pub mod estimate;
pub mod optimizer;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod plan;
pub mod runtime;
pub mod schedule;
pub mod settings;
pub mod solver;
pub mod table;
pub mod tree;
