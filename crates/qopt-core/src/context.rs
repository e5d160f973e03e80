//! Per-invocation identity allocation.

use crate::plan::PlanId;
use crate::schema::{Column, ColumnId, DataType};

/// Counters for plan node ids and column ids.
///
/// The plan builder and the optimizer share one context per statement, so ids
/// minted by rules continue the builder's sequence and trace text stays
/// deterministic for a given input.
#[derive(Debug, Clone)]
pub struct PlanContext {
    next_plan_id: u64,
    next_column_id: u64,
}

impl PlanContext {
    pub fn new() -> Self {
        Self {
            next_plan_id: 1,
            next_column_id: 1,
        }
    }

    pub fn next_plan_id(&mut self) -> PlanId {
        let id = PlanId(self.next_plan_id);
        self.next_plan_id += 1;
        id
    }

    pub fn next_column_id(&mut self) -> ColumnId {
        let id = ColumnId(self.next_column_id);
        self.next_column_id += 1;
        id
    }

    /// A fresh `Column#N` output column.
    pub fn derived_column(&mut self, data_type: DataType, nullable: bool) -> Column {
        Column::derived(self.next_column_id(), data_type, nullable)
    }

    /// The id the next minted plan node will receive.
    pub fn peek_plan_id(&self) -> u64 {
        self.next_plan_id
    }
}

impl Default for PlanContext {
    fn default() -> Self {
        Self::new()
    }
}
