//! Update schedules: the ordered work a solver iteration performs.
//!
//! The optimizer only cares about one aspect of a schedule: how many times
//! each factor table is updated as a whole node per iteration. Single-edge
//! updates never use a shared plan and do not count. Schedules nest, so
//! counting walks the structure recursively.

use rustc_hash::FxHashMap;

use crate::engine::table::TableId;

/// One entry of an update schedule.
#[derive(Debug, Clone)]
pub enum ScheduleEntry {
    /// A whole-node update of every edge of a factor backed by `table`.
    FactorUpdate(TableId),
    /// An update of a single outgoing edge; never planned.
    EdgeUpdate { table: TableId, edge: usize },
    /// A nested sub-schedule, executed in place.
    Sub(Schedule),
}

/// An ordered, possibly nested list of update steps for one iteration.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-table counts of whole-node updates in one pass over this schedule,
    /// including nested sub-schedules. Tables that only receive edge updates
    /// are absent from the map.
    pub fn factor_update_counts(&self) -> FxHashMap<TableId, usize> {
        let mut counts = FxHashMap::default();
        self.accumulate_counts(&mut counts);
        counts
    }

    fn accumulate_counts(&self, counts: &mut FxHashMap<TableId, usize>) {
        for entry in &self.entries {
            match entry {
                ScheduleEntry::FactorUpdate(table) => {
                    *counts.entry(*table).or_insert(0) += 1;
                }
                ScheduleEntry::EdgeUpdate { .. } => {}
                ScheduleEntry::Sub(sub) => sub.accumulate_counts(counts),
            }
        }
    }
}
