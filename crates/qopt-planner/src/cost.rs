//! Row-count and NDV estimation.
//!
//! We derive a `StatsInfo` per operator by walking the logical plan bottom-up.
//! Base tables use the statistics attached to their catalog entry; anything
//! missing falls back to `OptimizerConfig` defaults, so estimation never fails.

use std::collections::HashMap;

use qopt_core::catalog::TableInfo;
use qopt_core::config::OptimizerConfig;
use qopt_core::expr::{BinOp, Expr};
use qopt_core::plan::{Aggregation, Join, JoinType, LogicalPlan, Operator};
use qopt_core::schema::{Column, ColumnId};
use qopt_core::stats::ColumnStats;

/// Estimated output of one operator.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsInfo {
    pub row_count: f64,
    ndv: HashMap<ColumnId, f64>,
}

impl StatsInfo {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            ndv: HashMap::new(),
        }
    }

    /// Distinct values of a column, capped at the row count.
    pub fn ndv(&self, col: ColumnId) -> f64 {
        self.ndv
            .get(&col)
            .copied()
            .unwrap_or(self.row_count)
            .min(self.row_count)
    }

    pub fn set_ndv(&mut self, col: ColumnId, ndv: f64) {
        self.ndv.insert(col, ndv);
    }

    /// Same NDVs over a different row count.
    fn scaled(&self, row_count: f64) -> StatsInfo {
        StatsInfo {
            row_count,
            ndv: self
                .ndv
                .iter()
                .map(|(k, v)| (*k, v.min(row_count)))
                .collect(),
        }
    }
}

pub struct CostModel<'a> {
    config: &'a OptimizerConfig,
}

impl<'a> CostModel<'a> {
    pub fn new(config: &'a OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn derive_stats(&self, plan: &LogicalPlan) -> StatsInfo {
        let children: Vec<StatsInfo> = plan.children.iter().map(|c| self.derive_stats(c)).collect();
        self.derive_node(plan, &children)
    }

    /// Stats of `plan` given the already derived stats of its children.
    pub fn derive_node(&self, plan: &LogicalPlan, children: &[StatsInfo]) -> StatsInfo {
        let first = children.first();
        match &plan.op {
            Operator::DataSource(ds) => {
                let mut stats = self.table_stats(&ds.table, &ds.table_columns);
                if ds.partition.is_some() {
                    let parts = ds
                        .table
                        .partition
                        .as_ref()
                        .map(|p| p.definitions.len().max(1))
                        .unwrap_or(1);
                    stats = stats.scaled(stats.row_count / parts as f64);
                }
                let selectivity = self.conditions_selectivity(&ds.table, &ds.table_columns, &ds.pushed_conds);
                stats.scaled(stats.row_count * selectivity)
            }
            Operator::Selection(sel) => {
                let Some(input) = first else {
                    return StatsInfo::new(0.0);
                };
                let factor = self.config.selection_factor.powi(sel.conditions.len() as i32);
                input.scaled(input.row_count * factor)
            }
            Operator::Projection(proj) => {
                let Some(input) = first else {
                    return StatsInfo::new(0.0);
                };
                let mut stats = StatsInfo::new(input.row_count);
                for (expr, col) in proj.exprs.iter().zip(&plan.schema.columns) {
                    let ndv = match expr.as_column() {
                        Some(c) => input.ndv(c.id),
                        None => input.row_count,
                    };
                    stats.set_ndv(col.id, ndv);
                }
                stats
            }
            Operator::Aggregation(agg) => {
                let Some(input) = first else {
                    return StatsInfo::new(0.0);
                };
                let groups = self.estimate_aggregate_groups(agg, input);
                let mut stats = StatsInfo::new(groups);
                for col in &plan.schema.columns {
                    stats.set_ndv(col.id, groups);
                }
                stats
            }
            Operator::Join(join) => match (children.first(), children.get(1)) {
                (Some(l), Some(r)) => self.join_stats(join, l, r),
                _ => StatsInfo::new(0.0),
            },
            Operator::Sort(_) => first.cloned().unwrap_or_else(|| StatsInfo::new(0.0)),
            Operator::Limit(l) => limited(first, l.count),
            Operator::TopN(t) => limited(first, t.count),
            Operator::Union | Operator::PartitionUnion => {
                let rows: f64 = children.iter().map(|c| c.row_count).sum();
                let mut stats = StatsInfo::new(rows);
                if matches!(plan.op, Operator::PartitionUnion) {
                    for col in &plan.schema.columns {
                        let ndv: f64 = children.iter().map(|c| c.ndv(col.id)).sum();
                        stats.set_ndv(col.id, ndv);
                    }
                }
                stats
            }
            Operator::TableDual(d) => StatsInfo::new(d.row_count as f64),
        }
    }

    /// Output estimate of a join given its inputs' estimates.
    ///
    /// Equi-joins produce `l * r / max(ndv_l, ndv_r)` rows, where each side's
    /// NDV is the largest NDV among its key columns; without keys the result is
    /// the cartesian product.
    pub fn join_stats(&self, join: &Join, left: &StatsInfo, right: &StatsInfo) -> StatsInfo {
        let cartesian = left.row_count * right.row_count;
        let mut rows = if join.eq_conds.is_empty() {
            cartesian
        } else {
            let lndv = join
                .eq_conds
                .iter()
                .map(|(l, _)| left.ndv(l.id))
                .fold(0.0, f64::max);
            let rndv = join
                .eq_conds
                .iter()
                .map(|(_, r)| right.ndv(r.id))
                .fold(0.0, f64::max);
            let max_ndv = lndv.max(rndv);
            if max_ndv > 0.0 {
                cartesian / max_ndv
            } else {
                cartesian
            }
        };
        match join.join_type {
            JoinType::Inner => {}
            JoinType::LeftOuter => rows = rows.max(left.row_count),
            JoinType::RightOuter => rows = rows.max(right.row_count),
        }
        let mut stats = StatsInfo::new(rows);
        for side in [left, right] {
            for (id, ndv) in &side.ndv {
                stats.set_ndv(*id, ndv.min(rows));
            }
        }
        stats
    }

    fn table_stats(&self, table: &TableInfo, columns: &[Column]) -> StatsInfo {
        let row_count = table
            .stats
            .as_ref()
            .map(|s| s.row_count)
            .unwrap_or(self.config.default_row_count);
        let mut stats = StatsInfo::new(row_count);
        for (info, col) in table.columns.iter().zip(columns) {
            let ndv = self
                .column_stats(table, &info.name)
                .and_then(|s| s.distinct_count)
                .map(|d| d as f64)
                .unwrap_or(row_count * self.config.distinct_factor);
            stats.set_ndv(col.id, ndv.min(row_count));
        }
        stats
    }

    fn column_stats<'t>(&self, table: &'t TableInfo, column: &str) -> Option<&'t ColumnStats> {
        table.stats.as_ref().and_then(|s| s.columns.get(column))
    }

    /// Combined selectivity of a conjunction over one table.
    fn conditions_selectivity(&self, table: &TableInfo, columns: &[Column], conds: &[Expr]) -> f64 {
        conds
            .iter()
            .map(|c| self.estimate_filter_selectivity(table, columns, c))
            .product()
    }

    /// Use column statistics for `col OP literal`; anything else gets the
    /// configured selection factor.
    fn estimate_filter_selectivity(&self, table: &TableInfo, columns: &[Column], cond: &Expr) -> f64 {
        let Expr::BinaryOp { op, left, right } = cond else {
            return self.config.selection_factor;
        };
        let (col, lit, op) = match (left.as_column(), right.as_literal(), right.as_column(), left.as_literal()) {
            (Some(c), Some(v), _, _) => (c, v, *op),
            (_, _, Some(c), Some(v)) => (c, v, op.flip()),
            _ => return self.config.selection_factor,
        };
        let Some(offset) = columns.iter().position(|c| c.id == col.id) else {
            return self.config.selection_factor;
        };
        let Some(stats) = table
            .columns
            .get(offset)
            .and_then(|info| self.column_stats(table, &info.name))
        else {
            return self.config.selection_factor;
        };
        match op {
            BinOp::Eq => stats.estimate_equality_selectivity(),
            BinOp::Ne => 1.0 - stats.estimate_equality_selectivity(),
            BinOp::Lt | BinOp::Le => stats.estimate_range_selectivity(None, Some(lit)),
            BinOp::Gt | BinOp::Ge => stats.estimate_range_selectivity(Some(lit), None),
            _ => self.config.selection_factor,
        }
    }

    /// Product of the group-by NDVs, capped at the input row count.
    fn estimate_aggregate_groups(&self, agg: &Aggregation, input: &StatsInfo) -> f64 {
        if agg.group_by.is_empty() {
            return 1.0;
        }
        let mut groups = 1.0;
        for item in &agg.group_by {
            let ndv = match item {
                Expr::Column(c) => input.ndv(c.id),
                e if e.is_constant() => 1.0,
                _ => input.row_count * self.config.distinct_factor,
            };
            groups = (groups * ndv.max(1.0)).min(input.row_count);
        }
        groups.min(input.row_count).max(1.0_f64.min(input.row_count))
    }
}

fn limited(input: Option<&StatsInfo>, count: u64) -> StatsInfo {
    match input {
        Some(s) => s.scaled(s.row_count.min(count as f64)),
        None => StatsInfo::new(0.0),
    }
}
