//! Partition pruning.
//!
//! The conditions over a partitioned scan are evaluated into the set of
//! partitioning-column values they admit; partitions that cannot hold any of
//! those values are dropped. What remains is a TableDual, a single-partition
//! scan, or a PartitionUnion of scans in partition declaration order.

use qopt_core::catalog::{PartitionBound, PartitionInfo, PartitionKind};
use qopt_core::error::Result;
use qopt_core::expr::{BinOp, Expr, UnaryOp};
use qopt_core::plan::{LogicalPlan, Operator};
use qopt_core::schema::ColumnId;

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

/// Ranges of at most this many values are enumerated for hash partitions.
const MAX_HASH_ENUMERATION: i128 = 32;

pub struct PartitionProcessor;

impl LogicalRule for PartitionProcessor {
    fn name(&self) -> &'static str {
        "partition_processor"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        process(plan, &[], ctx)
    }
}

/// `parent_conds` are the conditions of a Selection directly above `plan`.
fn process(plan: LogicalPlan, parent_conds: &[Expr], ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let prunable = matches!(
        &plan.op,
        Operator::DataSource(ds) if ds.partition.is_none() && ds.table.partition.is_some()
    );
    if prunable {
        return prune(plan, parent_conds, ctx);
    }
    let conds = match &plan.op {
        Operator::Selection(sel) => sel.conditions.clone(),
        _ => Vec::new(),
    };
    let mut plan = plan.map_children(|c| process(c, &conds, ctx))?;
    refresh_key_info(&mut plan);
    Ok(plan)
}

fn prune(plan: LogicalPlan, parent_conds: &[Expr], ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let Operator::DataSource(ds) = &plan.op else {
        return Ok(plan);
    };
    let Some(info) = ds.table.partition.clone() else {
        return Ok(plan);
    };
    let Some(column) = ds
        .table
        .column_offset(&info.column)
        .and_then(|off| ds.table_columns.get(off))
        .map(|c| c.id)
    else {
        return Ok(plan);
    };

    let values = ds
        .pushed_conds
        .iter()
        .chain(parent_conds)
        .fold(ValueSet::full(), |acc, cond| acc.intersect(&ValueSet::eval(cond, column)));
    let matched = matching_partitions(&info, &values);
    let ds_id = plan.display_id();

    #[cfg(feature = "tracing")]
    tracing::trace!(scan = %ds_id, partitions = matched.len(), "pruned partitions");
    match matched.as_slice() {
        [] => {
            let dual = LogicalPlan::table_dual(ctx.plan_ctx, plan.schema.clone(), 0);
            ctx.record(
                || format!("{} becomes {}", ds_id, dual.display_id()),
                || format!("{} doesn't have needed partition table after pruning", ds_id),
            );
            Ok(dual)
        }
        [only] => {
            if let Operator::DataSource(ds) = &mut plan.op {
                ds.partition = Some(*only);
            }
            let name = partition_name(&info, *only);
            ctx.record(
                || format!("{} becomes {}", ds_id, plan.display_id()),
                || format!("{} has one needed partition[{}] after pruning", ds_id, name),
            );
            Ok(plan)
        }
        many => {
            let scans: Vec<LogicalPlan> = many
                .iter()
                .map(|idx| {
                    let mut scan = plan.clone();
                    if let Operator::DataSource(ds) = &mut scan.op {
                        ds.partition = Some(*idx);
                    }
                    scan
                })
                .collect();
            let scan_ids: Vec<String> = scans.iter().map(LogicalPlan::display_id).collect();
            let names: Vec<&str> = many.iter().map(|idx| partition_name(&info, *idx)).collect();
            let mut union = LogicalPlan::from_parts(
                ctx.next_plan_id(),
                Operator::PartitionUnion,
                plan.schema.clone(),
                scans,
            );
            refresh_key_info(&mut union);
            ctx.record(
                || format!("{} becomes {} with children[{}]", ds_id, union.display_id(), scan_ids.join(",")),
                || format!("{} has multiple needed partitions[{}] after pruning", ds_id, names.join(",")),
            );
            Ok(union)
        }
    }
}

fn partition_name(info: &PartitionInfo, idx: usize) -> &str {
    info.definitions.get(idx).map(|d| d.name.as_str()).unwrap_or("")
}

/// Indices of the partitions that may hold a value of `values`, in
/// declaration order.
pub fn matching_partitions(info: &PartitionInfo, values: &ValueSet) -> Vec<usize> {
    let n = info.definitions.len();
    match info.kind {
        PartitionKind::Range => {
            let mut lower = i64::MIN;
            let mut out = Vec::new();
            for (i, def) in info.definitions.iter().enumerate() {
                let upper = match def.bound {
                    PartitionBound::LessThan(Some(bound)) => bound.checked_sub(1),
                    _ => Some(i64::MAX),
                };
                // NULL sorts below every value and lands in the first partition.
                let hit = (values.null && i == 0)
                    || upper.is_some_and(|hi| lower <= hi && values.overlaps(lower, hi));
                if hit {
                    out.push(i);
                }
                if let PartitionBound::LessThan(Some(bound)) = def.bound {
                    lower = lower.max(bound);
                }
            }
            out
        }
        PartitionKind::Hash => {
            if n == 0 {
                return Vec::new();
            }
            let mut hit = vec![false; n];
            if values.null {
                hit[0] = true;
            }
            for &(lo, hi) in &values.ranges {
                if i128::from(hi) - i128::from(lo) >= MAX_HASH_ENUMERATION {
                    return (0..n).collect();
                }
                for v in lo..=hi {
                    hit[hash_partition(v, n)] = true;
                }
            }
            (0..n).filter(|i| hit[*i]).collect()
        }
        PartitionKind::List => info
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, def)| match &def.bound {
                PartitionBound::In(list) => list.iter().any(|v| match v {
                    Some(v) => values.contains(*v),
                    None => values.null,
                }),
                _ => false,
            })
            .map(|(i, _)| i)
            .collect(),
    }
}

/// `abs(v mod n)`.
pub fn hash_partition(value: i64, partitions: usize) -> usize {
    let n = partitions as i64;
    (value % n).unsigned_abs() as usize
}

/// Values of the partitioning column a condition admits: disjoint inclusive
/// integer ranges, plus whether NULL is admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSet {
    pub ranges: Vec<(i64, i64)>,
    pub null: bool,
}

impl ValueSet {
    pub fn full() -> Self {
        Self {
            ranges: vec![(i64::MIN, i64::MAX)],
            null: true,
        }
    }

    pub fn empty() -> Self {
        Self {
            ranges: Vec::new(),
            null: false,
        }
    }

    pub fn point(v: i64) -> Self {
        Self::range(v, v)
    }

    pub fn range(lo: i64, hi: i64) -> Self {
        if lo > hi {
            return Self::empty();
        }
        Self {
            ranges: vec![(lo, hi)],
            null: false,
        }
    }

    fn only_null() -> Self {
        Self {
            ranges: Vec::new(),
            null: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && !self.null
    }

    pub fn contains(&self, v: i64) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= v && v <= hi)
    }

    pub fn overlaps(&self, lo: i64, hi: i64) -> bool {
        self.ranges.iter().any(|&(a, b)| a <= hi && lo <= b)
    }

    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut ranges = self.ranges.clone();
        ranges.extend(other.ranges.iter().copied());
        ValueSet {
            ranges: normalize(ranges),
            null: self.null || other.null,
        }
    }

    pub fn intersect(&self, other: &ValueSet) -> ValueSet {
        let mut ranges = Vec::new();
        for &(a, b) in &self.ranges {
            for &(c, d) in &other.ranges {
                let (lo, hi) = (a.max(c), b.min(d));
                if lo <= hi {
                    ranges.push((lo, hi));
                }
            }
        }
        ValueSet {
            ranges: normalize(ranges),
            null: self.null && other.null,
        }
    }

    /// Values of `column` for which `cond` may hold. Shapes that cannot be
    /// analysed admit everything.
    pub fn eval(cond: &Expr, column: ColumnId) -> ValueSet {
        let is_target = |e: &Expr| e.as_column().is_some_and(|c| c.id == column);
        match cond {
            Expr::BinaryOp {
                op: BinOp::And,
                left,
                right,
            } => Self::eval(left, column).intersect(&Self::eval(right, column)),
            Expr::BinaryOp {
                op: BinOp::Or,
                left,
                right,
            } => Self::eval(left, column).union(&Self::eval(right, column)),
            Expr::BinaryOp { op, left, right } if op.is_comparison() => {
                let (lit, op) = if is_target(left) {
                    (right.as_literal(), *op)
                } else if is_target(right) {
                    (left.as_literal(), op.flip())
                } else {
                    return Self::full();
                };
                let Some(lit) = lit else {
                    return Self::full();
                };
                if lit.is_null() {
                    return Self::empty();
                }
                let Some(v) = lit.as_i64() else {
                    return Self::full();
                };
                Self::compare(op, v)
            }
            Expr::UnaryOp {
                op: UnaryOp::IsNull,
                arg,
            } if is_target(arg) => Self::only_null(),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                arg,
            } => match arg.as_ref() {
                Expr::UnaryOp {
                    op: UnaryOp::IsNull,
                    arg,
                } if is_target(arg) => Self::range(i64::MIN, i64::MAX),
                _ => Self::full(),
            },
            Expr::InList { expr, list } if is_target(expr) => {
                let mut set = Self::empty();
                for item in list {
                    match item.as_literal() {
                        Some(lit) if lit.is_null() => {}
                        Some(lit) => match lit.as_i64() {
                            Some(v) => set = set.union(&Self::point(v)),
                            None => return Self::full(),
                        },
                        None => return Self::full(),
                    }
                }
                set
            }
            _ => Self::full(),
        }
    }

    /// `column OP v`.
    fn compare(op: BinOp, v: i64) -> ValueSet {
        match op {
            BinOp::Eq => Self::point(v),
            BinOp::Ne => {
                let below = v.checked_sub(1).map(|hi| Self::range(i64::MIN, hi));
                let above = v.checked_add(1).map(|lo| Self::range(lo, i64::MAX));
                below
                    .unwrap_or_else(Self::empty)
                    .union(&above.unwrap_or_else(Self::empty))
            }
            BinOp::Lt => v.checked_sub(1).map_or_else(Self::empty, |hi| Self::range(i64::MIN, hi)),
            BinOp::Le => Self::range(i64::MIN, v),
            BinOp::Gt => v.checked_add(1).map_or_else(Self::empty, |lo| Self::range(lo, i64::MAX)),
            BinOp::Ge => Self::range(v, i64::MAX),
            _ => Self::full(),
        }
    }
}

/// Sort and merge overlapping or adjacent ranges.
fn normalize(mut ranges: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    ranges.sort_unstable();
    let mut out: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => out.push((lo, hi)),
        }
    }
    out
}
