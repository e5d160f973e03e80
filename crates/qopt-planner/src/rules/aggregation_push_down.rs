//! Aggregation push-down.
//!
//! A decomposable aggregation above an inner join is split into a partial
//! aggregation on a join input and a final one above the join; above a union
//! it becomes one partial aggregation per union input. A Projection directly
//! below an aggregation is folded into it first, so unions hidden behind a
//! renaming projection are still reached.

use std::collections::{HashMap, HashSet};

use qopt_core::error::{Error, Result};
use qopt_core::expr::Expr;
use qopt_core::plan::{agg_func_list, AggFunc, AggKind, AggMode, Aggregation, JoinType, LogicalPlan, Operator};
use qopt_core::schema::{Column, ColumnId, Schema};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct AggregationPushDown;

impl LogicalRule for AggregationPushDown {
    fn name(&self) -> &'static str {
        "aggregation_push_down"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        push_down(plan, ctx)
    }
}

fn push_down(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    if matches!(plan.op, Operator::Aggregation(_)) {
        plan = rewrite_aggregation(plan, ctx)?;
    }
    let mut plan = plan.map_children(|c| push_down(c, ctx))?;
    plan.refresh_schema();
    refresh_key_info(&mut plan);
    Ok(plan)
}

fn rewrite_aggregation(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    // Already split aggregations stay where they are.
    let complete = match &plan.op {
        Operator::Aggregation(agg) => agg.agg_funcs.iter().all(|f| f.mode == AggMode::Complete),
        _ => return Ok(plan),
    };
    let (inner_join, projection) = match &plan.child(0)?.op {
        Operator::Join(join) => (join.join_type == JoinType::Inner, false),
        Operator::Projection(_) => (false, true),
        _ => (false, false),
    };
    if inner_join {
        return if complete { push_across_join(plan, ctx) } else { Ok(plan) };
    }
    if projection {
        plan = fold_projection(plan, ctx)?;
    }
    if complete && matches!(plan.child(0)?.op, Operator::Union) {
        plan = push_across_union(plan, ctx)?;
    }
    Ok(plan)
}

/// Functions and group-by columns of an aggregation split by join input.
struct SideSplit {
    left_funcs: Vec<usize>,
    right_funcs: Vec<usize>,
    left_gby: Vec<Column>,
    right_gby: Vec<Column>,
}

/// `None` when a function is not decomposable or reads both inputs.
fn split_by_side(plan: &LogicalPlan) -> Option<SideSplit> {
    let Operator::Aggregation(agg) = &plan.op else {
        return None;
    };
    let join_plan = plan.children.first()?;
    let Operator::Join(join) = &join_plan.op else {
        return None;
    };
    let left_ids = join_plan.children.first()?.schema.id_set();
    let right_ids = join_plan.children.get(1)?.schema.id_set();

    let mut split = SideSplit {
        left_funcs: Vec::new(),
        right_funcs: Vec::new(),
        left_gby: Vec::new(),
        right_gby: Vec::new(),
    };
    for (i, func) in agg.agg_funcs.iter().enumerate() {
        if !func.is_decomposable() {
            return None;
        }
        let cols = func.columns();
        let from_left = cols.iter().any(|c| left_ids.contains(&c.id));
        let from_right = cols.iter().any(|c| right_ids.contains(&c.id));
        match (from_left, from_right) {
            (true, true) => return None,
            (true, false) => split.left_funcs.push(i),
            // Constant arguments, `count(*)` included, go right.
            _ => split.right_funcs.push(i),
        }
    }

    let add = |col: Column, split: &mut SideSplit| {
        let side = if left_ids.contains(&col.id) {
            &mut split.left_gby
        } else {
            &mut split.right_gby
        };
        if !side.iter().any(|c| c.id == col.id) {
            side.push(col);
        }
    };
    for item in &agg.group_by {
        for col in item.columns() {
            add(col, &mut split);
        }
    }
    for (l, r) in &join.eq_conds {
        add(l.clone(), &mut split);
        add(r.clone(), &mut split);
    }
    for cond in &join.other_conds {
        for col in cond.columns() {
            add(col, &mut split);
        }
    }
    Some(split)
}

fn push_across_join(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let Some(split) = split_by_side(&plan) else {
        return Ok(plan);
    };
    let counts_or_sums = |plan: &LogicalPlan, idx: &[usize]| match &plan.op {
        Operator::Aggregation(agg) => idx.iter().any(|i| {
            agg.agg_funcs
                .get(*i)
                .is_some_and(|f| matches!(f.kind, AggKind::Count | AggKind::Sum))
        }),
        _ => false,
    };
    // A count or sum on one side would be multiplied by a partial
    // aggregation collapsing rows of the other side.
    let right_invalid = counts_or_sums(&plan, &split.left_funcs);
    let left_invalid = counts_or_sums(&plan, &split.right_funcs);

    let mut join = plan.take_single_child()?;
    let (left, right) = join.take_join_children()?;
    let right = if right_invalid {
        right
    } else {
        push_to_side(&mut plan, &join, &split.right_funcs, &split.right_gby, right, "right", ctx)?
    };
    let left = if left_invalid {
        left
    } else {
        push_to_side(&mut plan, &join, &split.left_funcs, &split.left_gby, left, "left", ctx)?
    };
    join.children = vec![left, right];
    join.refresh_schema();
    refresh_key_info(&mut join);
    plan.children = vec![join];
    refresh_key_info(&mut plan);
    Ok(plan)
}

/// Put a partial aggregation of `funcs` over one join input, rewriting those
/// functions of `agg_plan` into final ones over its outputs.
#[allow(clippy::too_many_arguments)]
fn push_to_side(
    agg_plan: &mut LogicalPlan,
    join: &LogicalPlan,
    funcs: &[usize],
    gby: &[Column],
    child: LogicalPlan,
    side: &str,
    ctx: &mut RuleContext<'_>,
) -> Result<LogicalPlan> {
    let agg_id = agg_plan.display_id();
    let Operator::Aggregation(agg) = &mut agg_plan.op else {
        return Ok(child);
    };
    let all_first_row = funcs
        .iter()
        .all(|i| agg.agg_funcs.get(*i).is_some_and(|f| f.kind == AggKind::FirstRow));
    if all_first_row || matches!(child.op, Operator::Join(_) | Operator::Aggregation(_)) {
        return Ok(child);
    }
    let gby_ids: HashSet<ColumnId> = gby.iter().map(|c| c.id).collect();
    if child
        .key_info
        .as_ref()
        .is_some_and(|k| k.covering_key(&gby_ids).is_some())
    {
        return Ok(child);
    }

    let id = ctx.next_plan_id();
    let mut partial_funcs = Vec::with_capacity(funcs.len() + gby.len());
    let mut columns = Vec::with_capacity(funcs.len() + gby.len());
    for &i in funcs {
        let func = agg
            .agg_funcs
            .get_mut(i)
            .ok_or_else(|| Error::malformed(agg_id.clone(), format!("no aggregate function #{}", i)))?;
        let partial = func.clone().with_mode(AggMode::Partial);
        let output = ctx.plan_ctx.derived_column(partial.return_type(), partial.return_nullable());
        func.args = vec![Expr::col(&output)];
        func.mode = AggMode::Final;
        partial_funcs.push(partial);
        columns.push(output);
    }
    for col in gby {
        partial_funcs.push(AggFunc::new(AggKind::FirstRow, vec![Expr::col(col)]));
        columns.push(col.clone());
    }
    // Without a grouping item an empty input would still yield one row.
    let group_by = if gby.is_empty() {
        vec![Expr::int(0)]
    } else {
        gby.iter().map(Expr::col).collect()
    };
    let mut partial = LogicalPlan::from_parts(
        id,
        Operator::Aggregation(Aggregation {
            group_by,
            agg_funcs: partial_funcs,
        }),
        Schema::new(columns),
        vec![child],
    );
    refresh_key_info(&mut partial);

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %agg_id, partial = %partial.display_id(), side, "pushed aggregation across join");
    let rewritten: Vec<&AggFunc> = funcs.iter().filter_map(|i| agg.agg_funcs.get(*i)).collect();
    let join_id = join.display_id();
    ctx.record(
        || {
            format!(
                "{} pushed down across {}, and {} {} path becomes {}",
                agg_id,
                join_id,
                join_id,
                side,
                partial.display_id()
            )
        },
        || format!("{}'s functions{} are decomposable with join", agg_id, agg_func_list(rewritten)),
    );
    Ok(partial)
}

/// Substitute the child Projection's expressions into the aggregation.
fn fold_projection(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let mut proj = plan.take_single_child()?;
    let map: HashMap<ColumnId, Expr> = match &proj.op {
        Operator::Projection(p) => proj
            .schema
            .columns
            .iter()
            .zip(&p.exprs)
            .map(|(c, e)| (c.id, e.clone()))
            .collect(),
        _ => {
            plan.children = vec![proj];
            return Ok(plan);
        }
    };
    let input = proj.take_single_child()?;
    if let Operator::Aggregation(agg) = &mut plan.op {
        agg.group_by = agg.group_by.iter().map(|e| e.substitute(&map)).collect();
        for func in &mut agg.agg_funcs {
            func.args = func.args.iter().map(|a| a.substitute(&map)).collect();
        }
    }
    plan.children = vec![input];

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %plan.display_id(), proj = %proj.display_id(), "folded projection into aggregation");
    let (proj_id, agg_id) = (proj.display_id(), plan.display_id());
    if let Operator::Aggregation(agg) = &plan.op {
        ctx.record(
            || {
                format!(
                    "{} is eliminated, and {}'s functions changed into{}",
                    proj_id,
                    agg_id,
                    agg_func_list(&agg.agg_funcs)
                )
            },
            || format!("{} is directly below an {} and has no side effects", proj_id, agg_id),
        );
    }
    Ok(plan)
}

/// One partial aggregation per union input; the union outputs the partial
/// results and the group-by columns, and the original aggregation combines them.
fn push_across_union(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let (funcs, gby_pos) = {
        let union = plan.child(0)?;
        let Operator::Aggregation(agg) = &plan.op else {
            return Ok(plan);
        };
        if !agg.agg_funcs.iter().all(AggFunc::is_decomposable) {
            return Ok(plan);
        }
        let positions: Option<Vec<usize>> = agg
            .group_by
            .iter()
            .map(|e| e.as_column().and_then(|c| union.schema.index_of(c.id)))
            .collect();
        let Some(mut positions) = positions else {
            return Ok(plan);
        };
        let mut seen = HashSet::new();
        positions.retain(|p| seen.insert(*p));
        (agg.agg_funcs.clone(), positions)
    };

    let mut union = plan.take_single_child()?;
    let union_schema = union.schema.clone();
    let children = std::mem::take(&mut union.children);
    let mut partials = Vec::with_capacity(children.len());
    for child in children {
        let map: HashMap<ColumnId, Expr> = union_schema
            .columns
            .iter()
            .zip(&child.schema.columns)
            .map(|(u, c)| (u.id, Expr::col(c)))
            .collect();
        let id = ctx.next_plan_id();
        let mut agg_funcs = Vec::with_capacity(funcs.len() + gby_pos.len());
        let mut columns = Vec::with_capacity(funcs.len() + gby_pos.len());
        for func in &funcs {
            let mut partial = func.clone().with_mode(AggMode::Partial);
            partial.args = partial.args.iter().map(|a| a.substitute(&map)).collect();
            columns.push(ctx.plan_ctx.derived_column(partial.return_type(), partial.return_nullable()));
            agg_funcs.push(partial);
        }
        let mut group_by = Vec::with_capacity(gby_pos.len());
        for &pos in &gby_pos {
            let col = child.schema.column(pos).cloned().ok_or_else(|| {
                Error::malformed(child.display_id(), format!("missing union column #{}", pos))
            })?;
            group_by.push(Expr::col(&col));
            agg_funcs.push(AggFunc::new(AggKind::FirstRow, vec![Expr::col(&col)]));
            columns.push(col);
        }
        let mut partial = LogicalPlan::from_parts(
            id,
            Operator::Aggregation(Aggregation { group_by, agg_funcs }),
            Schema::new(columns),
            vec![child],
        );
        refresh_key_info(&mut partial);
        partials.push(partial);
    }

    let mut union_columns = Vec::with_capacity(funcs.len() + gby_pos.len());
    for i in 0..funcs.len() {
        let nullable = partials
            .iter()
            .any(|p| p.schema.column(i).is_some_and(|c| c.nullable));
        let data_type = partials
            .first()
            .and_then(|p| p.schema.column(i))
            .map(|c| c.data_type.clone())
            .ok_or_else(|| Error::malformed(union.display_id(), "union without inputs"))?;
        union_columns.push(ctx.plan_ctx.derived_column(data_type, nullable));
    }
    for &pos in &gby_pos {
        if let Some(col) = union_schema.column(pos) {
            union_columns.push(col.clone());
        }
    }
    let partial_ids: Vec<String> = partials.iter().map(LogicalPlan::display_id).collect();
    union.children = partials;
    union.schema = Schema::new(union_columns);

    if let Operator::Aggregation(agg) = &mut plan.op {
        for (func, col) in agg.agg_funcs.iter_mut().zip(&union.schema.columns) {
            func.args = vec![Expr::col(col)];
            func.mode = AggMode::Final;
        }
    }
    let union_id = union.display_id();
    plan.children = vec![union];
    refresh_key_info(&mut plan);

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %plan.display_id(), union = %union_id, "pushed aggregation across union");
    let agg_id = plan.display_id();
    if let Operator::Aggregation(agg) = &plan.op {
        ctx.record(
            || {
                format!(
                    "{} pushed down, and {}'s children changed into[{}]",
                    agg_id,
                    union_id,
                    partial_ids.join(",")
                )
            },
            || {
                format!(
                    "{} functions{} are decomposable with {}",
                    agg_id,
                    agg_func_list(&agg.agg_funcs),
                    union_id
                )
            },
        );
    }
    Ok(plan)
}
