//! Column pruning.
//!
//! Top-down: every node receives the set of its output columns its parent
//! actually reads, drops the rest, and asks its children only for what it still
//! needs itself.

use std::collections::HashSet;

use qopt_core::error::Result;
use qopt_core::plan::{LogicalPlan, Operator};
use qopt_core::schema::{column_list, Column, ColumnId, Schema};

use crate::optimizer::RuleContext;
use crate::rules::LogicalRule;

pub struct ColumnPruner;

impl LogicalRule for ColumnPruner {
    fn name(&self) -> &'static str {
        "column_prune"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        let used = plan.schema.id_set();
        Pruner { ctx: Some(ctx) }.prune(plan, &used)
    }
}

/// Prune `plan` down to `used` without recording trace steps.
pub(crate) fn prune_silently(plan: LogicalPlan, used: &HashSet<ColumnId>) -> Result<LogicalPlan> {
    Pruner { ctx: None }.prune(plan, used)
}

struct Pruner<'c, 'a> {
    ctx: Option<&'c mut RuleContext<'a>>,
}

impl Pruner<'_, '_> {
    fn record(&mut self, node: &LogicalPlan, pruned: &[Column]) {
        if pruned.is_empty() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(node = %node.display_id(), pruned = pruned.len(), "pruned columns");
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.record(
                || format!("{}'s columns{} have been pruned", node.display_id(), column_list(pruned)),
                String::new,
            );
        }
    }

    fn prune(&mut self, plan: LogicalPlan, used: &HashSet<ColumnId>) -> Result<LogicalPlan> {
        let mut plan = plan;
        if matches!(plan.op, Operator::Union) {
            plan = self.prune_union(plan, used)?;
        }
        match &mut plan.op {
            Operator::DataSource(ds) => {
                let mut keep = used.clone();
                for cond in &ds.pushed_conds {
                    keep.extend(cond.column_ids());
                }
                let (mut kept, mut pruned): (Vec<Column>, Vec<Column>) =
                    plan.schema.columns.iter().cloned().partition(|c| keep.contains(&c.id));
                if kept.is_empty() && !pruned.is_empty() {
                    // A scan must still produce rows: keep the handle, else the first column.
                    let handle = ds
                        .table
                        .primary_key
                        .as_deref()
                        .and_then(|pk| ds.table.column_offset(pk))
                        .and_then(|off| ds.table_columns.get(off))
                        .map(|c| c.id);
                    let idx = handle
                        .and_then(|id| pruned.iter().position(|c| c.id == id))
                        .unwrap_or(0);
                    kept.push(pruned.remove(idx));
                }
                if !pruned.is_empty() {
                    plan.schema = Schema::new(kept);
                    self.record(&plan, &pruned);
                }
            }
            Operator::Projection(proj) => {
                let keep = keep_mask(&plan.schema, used);
                let mut exprs = Vec::new();
                let mut kept = Vec::new();
                let mut pruned = Vec::new();
                for ((expr, col), k) in proj.exprs.drain(..).zip(plan.schema.columns.drain(..)).zip(keep) {
                    if k {
                        exprs.push(expr);
                        kept.push(col);
                    } else {
                        pruned.push(col);
                    }
                }
                proj.exprs = exprs;
                plan.schema = Schema::new(kept);
                let child_used: HashSet<ColumnId> =
                    proj.exprs.iter().flat_map(|e| e.column_ids()).collect();
                self.record(&plan, &pruned);
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, &child_used)?];
            }
            Operator::Selection(sel) => {
                let mut child_used = used.clone();
                for cond in &sel.conditions {
                    child_used.extend(cond.column_ids());
                }
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, &child_used)?];
                plan.refresh_schema();
            }
            Operator::Aggregation(agg) => {
                let keep = keep_mask(&plan.schema, used);
                let mut funcs = Vec::new();
                let mut kept = Vec::new();
                let mut pruned = Vec::new();
                for ((func, col), k) in agg.agg_funcs.drain(..).zip(plan.schema.columns.drain(..)).zip(keep) {
                    if k {
                        funcs.push(func);
                        kept.push(col);
                    } else {
                        pruned.push(col);
                    }
                }
                agg.agg_funcs = funcs;
                plan.schema = Schema::new(kept);
                let mut child_used: HashSet<ColumnId> =
                    agg.group_by.iter().flat_map(|e| e.column_ids()).collect();
                for func in &agg.agg_funcs {
                    child_used.extend(func.columns().iter().map(|c| c.id));
                }
                self.record(&plan, &pruned);
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, &child_used)?];
            }
            Operator::Sort(sort) => {
                let mut child_used = used.clone();
                for item in &sort.by_items {
                    child_used.extend(item.expr.column_ids());
                }
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, &child_used)?];
                plan.refresh_schema();
            }
            Operator::TopN(topn) => {
                let mut child_used = used.clone();
                for item in &topn.by_items {
                    child_used.extend(item.expr.column_ids());
                }
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, &child_used)?];
                plan.refresh_schema();
            }
            Operator::Limit(_) => {
                let child = plan.take_single_child()?;
                plan.children = vec![self.prune(child, used)?];
                plan.refresh_schema();
            }
            Operator::Join(join) => {
                let mut needed = used.clone();
                for (l, r) in &join.eq_conds {
                    needed.insert(l.id);
                    needed.insert(r.id);
                }
                for cond in &join.other_conds {
                    needed.extend(cond.column_ids());
                }
                let (left, right) = plan.take_join_children()?;
                let left_used: HashSet<ColumnId> =
                    left.schema.ids().into_iter().filter(|id| needed.contains(id)).collect();
                let right_used: HashSet<ColumnId> =
                    right.schema.ids().into_iter().filter(|id| needed.contains(id)).collect();
                plan.children = vec![self.prune(left, &left_used)?, self.prune(right, &right_used)?];
                plan.refresh_schema();
            }
            Operator::Union => {}
            Operator::PartitionUnion => {
                let children = std::mem::take(&mut plan.children);
                plan.children = children
                    .into_iter()
                    .map(|c| self.prune(c, used))
                    .collect::<Result<_>>()?;
                plan.refresh_schema();
            }
            Operator::TableDual(_) => {
                plan.schema.columns.retain(|c| used.contains(&c.id));
            }
        }
        if let Some(keys) = plan.key_info.as_mut() {
            keys.retain_in(&plan.schema);
        }
        Ok(plan)
    }

    /// Union columns are matched to children by position, so positions can only
    /// be dropped when every child is a Projection that can drop them too.
    fn prune_union(&mut self, plan: LogicalPlan, used: &HashSet<ColumnId>) -> Result<LogicalPlan> {
        let mut plan = plan;
        let keep: Vec<bool> = plan.schema.columns.iter().map(|c| used.contains(&c.id)).collect();
        let prunable = keep.iter().any(|k| *k)
            && keep.iter().any(|k| !*k)
            && plan
                .children
                .iter()
                .all(|c| matches!(c.op, Operator::Projection(_)) && c.schema.len() == keep.len());

        let children = std::mem::take(&mut plan.children);
        let mut new_children = Vec::with_capacity(children.len());
        for child in children {
            if !prunable {
                let all = child.schema.id_set();
                new_children.push(self.prune(child, &all)?);
                continue;
            }
            let mut child = child;
            let mut pruned = Vec::new();
            if let Operator::Projection(proj) = &mut child.op {
                let exprs = std::mem::take(&mut proj.exprs);
                let cols = std::mem::take(&mut child.schema.columns);
                for ((expr, col), k) in exprs.into_iter().zip(cols).zip(&keep) {
                    if *k {
                        proj.exprs.push(expr);
                        child.schema.columns.push(col);
                    } else {
                        pruned.push(col);
                    }
                }
            }
            self.record(&child, &pruned);
            let child_used: HashSet<ColumnId> = match &child.op {
                Operator::Projection(proj) => proj.exprs.iter().flat_map(|e| e.column_ids()).collect(),
                _ => child.schema.id_set(),
            };
            let grandchild = child.take_single_child()?;
            child.children = vec![self.prune(grandchild, &child_used)?];
            if let Some(keys) = child.key_info.as_mut() {
                keys.retain_in(&child.schema);
            }
            new_children.push(child);
        }
        plan.children = new_children;
        if prunable {
            let cols = std::mem::take(&mut plan.schema.columns);
            plan.schema.columns = cols
                .into_iter()
                .zip(&keep)
                .filter_map(|(c, k)| k.then_some(c))
                .collect();
        }
        Ok(plan)
    }
}

/// Which output positions survive; the first one is kept when none is used.
fn keep_mask(schema: &Schema, used: &HashSet<ColumnId>) -> Vec<bool> {
    let mut keep: Vec<bool> = schema.columns.iter().map(|c| used.contains(&c.id)).collect();
    if !keep.iter().any(|k| *k) {
        if let Some(first) = keep.first_mut() {
            *first = true;
        }
    }
    keep
}
