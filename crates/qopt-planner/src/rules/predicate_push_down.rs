//! Predicate push-down.
//!
//! Conditions travel from Selections towards the scans. Each node takes the
//! predicates offered by its parent, hands what it can to its children and
//! returns the ones that must stay above it; the parent then keeps those in a
//! Selection of its own.

use std::collections::{HashMap, HashSet};

use qopt_core::error::Result;
use qopt_core::expr::{expr_list, BinOp, Expr};
use qopt_core::plan::{Join, JoinType, LogicalPlan, Operator};
use qopt_core::schema::{Column, ColumnId};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct PredicatePushDown;

impl LogicalRule for PredicatePushDown {
    fn name(&self) -> &'static str {
        "predicate_push_down"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        let (retained, plan) = push(plan, Vec::new(), ctx)?;
        Ok(add_selection(plan, retained, ctx))
    }
}

/// Push `preds` into `plan`; returns the predicates left for the caller.
fn push(plan: LogicalPlan, preds: Vec<Expr>, ctx: &mut RuleContext<'_>) -> Result<(Vec<Expr>, LogicalPlan)> {
    if matches!(plan.op, Operator::Join(_)) {
        return push_join(plan, preds, ctx);
    }
    let mut plan = plan;
    match &mut plan.op {
        Operator::DataSource(ds) => {
            if !preds.is_empty() {
                let text = expr_list(&preds);
                for p in preds {
                    if !ds.pushed_conds.contains(&p) {
                        ds.pushed_conds.push(p);
                    }
                }
                #[cfg(feature = "tracing")]
                tracing::trace!(scan = %plan.display_id(), "pushed conditions into scan");
                let id = plan.display_id();
                ctx.record(|| format!("The conditions{} are pushed down to {}", text, id), String::new);
            }
            Ok((Vec::new(), plan))
        }
        Operator::Selection(sel) => {
            let own = std::mem::take(&mut sel.conditions);
            let mut conds = own.clone();
            for p in preds {
                if !conds.contains(&p) {
                    conds.push(p);
                }
            }
            let child = plan.take_single_child()?;
            let (retained, child) = push(child, conds.clone(), ctx)?;
            let sel_id = plan.display_id();
            if retained.is_empty() {
                #[cfg(feature = "tracing")]
                tracing::trace!(selection = %sel_id, "selection removed");
                ctx.record(
                    || format!("{} is removed", sel_id),
                    || format!("The conditions{} in {} are pushed down", expr_list(&conds), sel_id),
                );
                return Ok((Vec::new(), child));
            }
            if retained != own {
                let text = expr_list(&retained);
                ctx.record(|| format!("{}'s conditions changed into{}", sel_id, text), String::new);
            }
            if let Operator::Selection(sel) = &mut plan.op {
                sel.conditions = retained;
            }
            plan.children = vec![child];
            plan.refresh_schema();
            refresh_key_info(&mut plan);
            Ok((Vec::new(), plan))
        }
        Operator::Projection(proj) => {
            let map: HashMap<ColumnId, Expr> = plan
                .schema
                .columns
                .iter()
                .zip(&proj.exprs)
                .map(|(c, e)| (c.id, e.clone()))
                .collect();
            let substituted: Vec<Expr> = preds.iter().map(|p| p.substitute(&map)).collect();
            let child = plan.take_single_child()?;
            plan.children = vec![push_child(child, substituted, ctx)?];
            refresh_key_info(&mut plan);
            Ok((Vec::new(), plan))
        }
        Operator::Sort(_) => {
            let child = plan.take_single_child()?;
            plan.children = vec![push_child(child, preds, ctx)?];
            plan.refresh_schema();
            Ok((Vec::new(), plan))
        }
        Operator::Join(_) => Ok((preds, plan)),
        Operator::Union => {
            let union_schema = plan.schema.clone();
            let children = std::mem::take(&mut plan.children);
            let mut new_children = Vec::with_capacity(children.len());
            for child in children {
                let map: HashMap<ColumnId, Expr> = union_schema
                    .columns
                    .iter()
                    .zip(&child.schema.columns)
                    .map(|(u, c)| (u.id, Expr::col(c)))
                    .collect();
                let child_preds = preds.iter().map(|p| p.substitute(&map)).collect();
                new_children.push(push_child(child, child_preds, ctx)?);
            }
            plan.children = new_children;
            Ok((Vec::new(), plan))
        }
        Operator::PartitionUnion => {
            let children = std::mem::take(&mut plan.children);
            plan.children = children
                .into_iter()
                .map(|c| push_child(c, preds.clone(), ctx))
                .collect::<Result<_>>()?;
            plan.refresh_schema();
            Ok((Vec::new(), plan))
        }
        // Conditions cannot move below these; their inputs still get a pass.
        Operator::Aggregation(_) | Operator::Limit(_) | Operator::TopN(_) => {
            let child = plan.take_single_child()?;
            plan.children = vec![push_child(child, Vec::new(), ctx)?];
            plan.refresh_schema();
            Ok((preds, plan))
        }
        Operator::TableDual(_) => Ok((preds, plan)),
    }
}

/// Push into a child and keep whatever it returns in a new Selection above it.
fn push_child(child: LogicalPlan, preds: Vec<Expr>, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let (retained, child) = push(child, preds, ctx)?;
    Ok(add_selection(child, retained, ctx))
}

fn add_selection(plan: LogicalPlan, conditions: Vec<Expr>, ctx: &mut RuleContext<'_>) -> LogicalPlan {
    if conditions.is_empty() {
        return plan;
    }
    let mut sel = LogicalPlan::selection(ctx.plan_ctx, plan, conditions);
    refresh_key_info(&mut sel);
    sel
}

fn push_join(plan: LogicalPlan, preds: Vec<Expr>, ctx: &mut RuleContext<'_>) -> Result<(Vec<Expr>, LogicalPlan)> {
    let mut plan = plan;
    let (left, right) = plan.take_join_children()?;
    let left_ids = left.schema.id_set();
    let right_ids = right.schema.id_set();
    let Operator::Join(join) = &mut plan.op else {
        plan.children = vec![left, right];
        return Ok((preds, plan));
    };

    let mut left_conds = Vec::new();
    let mut right_conds = Vec::new();
    let mut retained = Vec::new();
    let absorbed = match join.join_type {
        JoinType::Inner => {
            let absorbed = expr_list(&preds);
            let had_preds = !preds.is_empty();
            let mut conds = std::mem::take(&mut join.other_conds);
            conds.extend(preds);
            for cond in conds {
                classify_inner(cond, join, &left_ids, &right_ids, &mut left_conds, &mut right_conds);
            }
            had_preds.then_some(absorbed)
        }
        JoinType::LeftOuter | JoinType::RightOuter => {
            let (outer_ids, inner_ids) = if join.join_type == JoinType::LeftOuter {
                (&left_ids, &right_ids)
            } else {
                (&right_ids, &left_ids)
            };
            let mut outer_conds = Vec::new();
            for pred in preds {
                if is_over(&pred, outer_ids) {
                    outer_conds.push(pred);
                } else {
                    retained.push(pred);
                }
            }
            // ON conditions over the inner side alone filter the inner input.
            let mut inner_conds = Vec::new();
            let other = std::mem::take(&mut join.other_conds);
            for cond in other {
                if is_over(&cond, inner_ids) {
                    inner_conds.push(cond);
                } else {
                    join.other_conds.push(cond);
                }
            }
            if join.join_type == JoinType::LeftOuter {
                left_conds = outer_conds;
                right_conds = inner_conds;
            } else {
                left_conds = inner_conds;
                right_conds = outer_conds;
            }
            None
        }
    };

    let join_id = plan.display_id();
    if let Some(text) = absorbed {
        #[cfg(feature = "tracing")]
        tracing::trace!(join = %join_id, "pushed conditions into join");
        ctx.record(|| format!("The conditions{} are pushed down to {}", text, join_id), String::new);
    }
    let left = push_child(left, left_conds, ctx)?;
    let right = push_child(right, right_conds, ctx)?;
    plan.children = vec![left, right];
    plan.refresh_schema();
    refresh_key_info(&mut plan);
    Ok((retained, plan))
}

/// All referenced columns come from `ids` (and at least one is referenced).
fn is_over(cond: &Expr, ids: &HashSet<ColumnId>) -> bool {
    let cols = cond.column_ids();
    !cols.is_empty() && cols.is_subset(ids)
}

/// Route one inner join condition: to a side, to the equality keys, or to
/// the join's other conditions.
fn classify_inner(
    cond: Expr,
    join: &mut Join,
    left_ids: &HashSet<ColumnId>,
    right_ids: &HashSet<ColumnId>,
    left_conds: &mut Vec<Expr>,
    right_conds: &mut Vec<Expr>,
) {
    if cond.is_constant() {
        left_conds.push(cond);
        return;
    }
    if is_over(&cond, left_ids) {
        left_conds.push(cond);
        return;
    }
    if is_over(&cond, right_ids) {
        right_conds.push(cond);
        return;
    }
    if let Some((l, r)) = equi_key(&cond, left_ids, right_ids) {
        if !join.eq_conds.contains(&(l.clone(), r.clone())) {
            join.eq_conds.push((l, r));
        }
        return;
    }
    if !join.other_conds.contains(&cond) {
        join.other_conds.push(cond);
    }
}

/// `eq(x, y)` between a column of each side, as `(left, right)`.
fn equi_key(cond: &Expr, left_ids: &HashSet<ColumnId>, right_ids: &HashSet<ColumnId>) -> Option<(Column, Column)> {
    let Expr::BinaryOp {
        op: BinOp::Eq,
        left,
        right,
    } = cond
    else {
        return None;
    };
    let (a, b) = (left.as_column()?, right.as_column()?);
    if left_ids.contains(&a.id) && right_ids.contains(&b.id) {
        Some((a.clone(), b.clone()))
    } else if left_ids.contains(&b.id) && right_ids.contains(&a.id) {
        Some((b.clone(), a.clone()))
    } else {
        None
    }
}
