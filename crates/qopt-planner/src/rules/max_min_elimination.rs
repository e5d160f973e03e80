//! Max/min elimination.
//!
//! `max(x)` without group by reads a single row once its input is ordered on
//! `x`, so the aggregation is fed by `Sort + Limit 1` (plus a null filter for
//! nullable `x`). A `max` and a `min` over indexed columns are split into one
//! such aggregation each, cross joined back together.

use std::collections::HashSet;

use qopt_core::error::{Error, Result};
use qopt_core::expr::Expr;
use qopt_core::plan::{AggFunc, AggKind, AggMode, Aggregation, ByItem, JoinType, LogicalPlan, Operator};
use qopt_core::schema::{Column, ColumnId, Schema};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::column_pruning::prune_silently;
use crate::rules::LogicalRule;

pub struct MaxMinEliminator;

impl LogicalRule for MaxMinEliminator {
    fn name(&self) -> &'static str {
        "max_min_eliminate"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        eliminate(plan, ctx)
    }
}

fn eliminate(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let plan = plan.map_children(|c| eliminate(c, ctx))?;
    let Operator::Aggregation(agg) = &plan.op else {
        return Ok(plan);
    };
    let only_max_min = !agg.agg_funcs.is_empty()
        && agg
            .agg_funcs
            .iter()
            .all(|f| matches!(f.kind, AggKind::Max | AggKind::Min) && f.mode == AggMode::Complete);
    if !agg.group_by.is_empty() || !only_max_min {
        return Ok(plan);
    }
    if agg.agg_funcs.len() == 1 {
        return eliminate_single(plan, ctx);
    }
    let kinds: Vec<AggKind> = agg.agg_funcs.iter().map(|f| f.kind).collect();
    if !matches!(kinds.as_slice(), [AggKind::Max, AggKind::Min] | [AggKind::Min, AggKind::Max]) {
        return Ok(plan);
    }
    let child = plan.child(0)?;
    let indexed = agg
        .agg_funcs
        .iter()
        .all(|f| f.args.first().and_then(Expr::as_column).is_some_and(|c| can_use_index(child, c)));
    if !indexed {
        return Ok(plan);
    }
    split(plan, ctx)
}

/// Ordered access on `col` is available from an index or the handle.
fn can_use_index(plan: &LogicalPlan, col: &Column) -> bool {
    match &plan.op {
        Operator::Selection(_) => plan.children.first().is_some_and(|c| can_use_index(c, col)),
        Operator::DataSource(ds) => ds
            .table_offset(col.id)
            .and_then(|off| ds.table.columns.get(off))
            .is_some_and(|info| ds.table.is_index_prefix(&info.name)),
        _ => false,
    }
}

fn eliminate_single(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let Operator::Aggregation(agg) = &plan.op else {
        return Ok(plan);
    };
    let Some(func) = agg.agg_funcs.first() else {
        return Ok(plan);
    };
    let kind = func.kind;
    let arg = func
        .args
        .first()
        .cloned()
        .ok_or_else(|| Error::malformed(plan.display_id(), format!("{} without argument", kind.name())))?;
    // Already reads at most one row.
    if plan.child(0)?.max_one_row() {
        return Ok(plan);
    }

    let mut child = plan.take_single_child()?;
    let mut selection = None;
    let mut sort = None;
    // A constant argument still needs the Limit: an empty input must yield NULL.
    if !arg.is_constant() {
        if arg.nullable() {
            child = LogicalPlan::selection(ctx.plan_ctx, child, vec![Expr::not_null(arg.clone())]);
            refresh_key_info(&mut child);
            selection = Some(child.display_id());
        }
        let item = if kind == AggKind::Max { ByItem::desc(arg) } else { ByItem::asc(arg) };
        child = LogicalPlan::sort(ctx.plan_ctx, child, vec![item]);
        refresh_key_info(&mut child);
        sort = Some(child.display_id());
    }
    child = LogicalPlan::limit(ctx.plan_ctx, child, 0, 1);
    refresh_key_info(&mut child);
    let limit = child.display_id();
    plan.children = vec![child];

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %plan.display_id(), func = kind.name(), "eliminated single max/min");
    let agg_id = plan.display_id();
    ctx.record(
        || {
            let mut action = String::new();
            for added in selection.iter().chain(sort.iter()) {
                action.push_str(&format!("add {},", added));
            }
            action.push_str(&format!("add {} during eliminating {} {} function", limit, agg_id, kind.name()));
            action
        },
        || {
            let mut reason = format!("{} has only one function[{}] without group by", agg_id, kind.name());
            if selection.is_some() {
                reason.push_str(&format!(
                    ", the columns in {} shouldn't be NULL and needs NULL to be filtered out",
                    agg_id
                ));
            }
            if sort.is_some() {
                reason.push_str(&format!(", the columns in {} should be sorted", agg_id));
            }
            reason
        },
    );
    Ok(plan)
}

/// One single-function aggregation per max/min over its own copy of the
/// input, joined back with cartesian inner joins.
fn split(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let funcs: Vec<AggFunc> = match &plan.op {
        Operator::Aggregation(agg) => agg.agg_funcs.clone(),
        _ => return Ok(plan),
    };
    let child = plan.take_single_child()?;

    let mut aggs = Vec::with_capacity(funcs.len());
    for (i, func) in funcs.into_iter().enumerate() {
        let output = plan
            .schema
            .column(i)
            .cloned()
            .ok_or_else(|| Error::malformed(plan.display_id(), format!("no output column for {}", func)))?;
        let id = ctx.next_plan_id();
        let input = child.clone_with_new_ids(ctx.plan_ctx);
        let used: HashSet<ColumnId> = func.columns().iter().map(|c| c.id).collect();
        let input = prune_silently(input, &used)?;
        let mut agg = LogicalPlan::from_parts(
            id,
            Operator::Aggregation(Aggregation {
                group_by: Vec::new(),
                agg_funcs: vec![func],
            }),
            Schema::new(vec![output]),
            vec![input],
        );
        refresh_key_info(&mut agg);
        aggs.push(agg);
    }

    let aggs = aggs
        .into_iter()
        .map(|agg| eliminate_single(agg, ctx))
        .collect::<Result<Vec<_>>>()?;
    let agg_ids: Vec<String> = aggs.iter().map(LogicalPlan::display_id).collect();

    let mut joins = Vec::new();
    let mut iter = aggs.into_iter();
    let mut root = iter
        .next()
        .ok_or_else(|| Error::malformed(plan.display_id(), "no aggregate functions to split"))?;
    for next in iter {
        root = LogicalPlan::join(ctx.plan_ctx, JoinType::Inner, root, next, Vec::new(), Vec::new());
        refresh_key_info(&mut root);
        joins.push(root.display_id());
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %plan.display_id(), parts = agg_ids.len(), "split max/min aggregation");
    let origin = plan.display_id();
    ctx.record(
        || {
            format!(
                "{} splited into [{}], and add [{}] to connect them during eliminating {} multi min/max functions",
                origin,
                agg_ids.join(","),
                joins.join(","),
                origin
            )
        },
        || {
            format!(
                "each column is sorted and can benefit from index/primary key in [{}] and none of them has group by clause",
                agg_ids.join(",")
            )
        },
    );
    Ok(root)
}
