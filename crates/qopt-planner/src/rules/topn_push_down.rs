//! TopN push-down.
//!
//! A Limit becomes a pending TopN that travels down the tree: a Sort below it
//! is fused (handing over its items if the TopN has none), Projections are
//! passed by substitution, outer joins and unions receive copies on the sides
//! holding every ordering column. Wherever it stops it is materialized again,
//! as a TopN, or as a Limit when it never picked up ordering items.

use std::collections::HashMap;

use qopt_core::error::Result;
use qopt_core::expr::Expr;
use qopt_core::plan::{by_item_list, ByItem, JoinType, Limit, LogicalPlan, Operator, PlanId, TopN};
use qopt_core::schema::{ColumnId, Schema};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct TopNPushDown;

impl LogicalRule for TopNPushDown {
    fn name(&self) -> &'static str {
        "topn_push_down"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        push(plan, None, ctx)
    }
}

/// Where a pending TopN came from.
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Converted from Limit `id`, which sat above node `child`.
    Limit { id: PlanId, child: PlanId },
    /// A TopN already in the tree, above node `child`.
    TopN { child: PlanId },
    /// A copy pushed below a join or a union.
    Copy,
}

#[derive(Debug, Clone)]
struct PendingTopN {
    id: PlanId,
    by_items: Vec<ByItem>,
    offset: u64,
    count: u64,
    origin: Origin,
    /// Fused a Sort, moved below a node, or spawned a copy.
    changed: bool,
}

impl PendingTopN {
    fn display_id(&self) -> String {
        format!("TopN_{}", self.id)
    }

    /// Row bound of a copy pushed to an input.
    fn copy_bound(&self) -> u64 {
        self.count.saturating_add(self.offset)
    }

    /// The conversion step of a Limit is only reported once the TopN actually
    /// does something.
    fn mark_changed(&mut self, ctx: &mut RuleContext<'_>) {
        if self.changed {
            return;
        }
        self.changed = true;
        if let Origin::Limit { id, .. } = self.origin {
            let topn = self.display_id();
            ctx.record(|| format!("Limit_{} is converted into {}", id, topn), String::new);
        }
    }
}

fn push(plan: LogicalPlan, pending: Option<PendingTopN>, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    if matches!(&plan.op, Operator::Join(j) if j.join_type != JoinType::Inner) {
        return push_outer_join(plan, pending, ctx);
    }
    if matches!(plan.op, Operator::Union) {
        return push_union(plan, pending, ctx);
    }
    let mut plan = plan;
    match &plan.op {
        Operator::Limit(limit) => {
            let (offset, count) = (limit.offset, limit.count);
            let child = plan.take_single_child()?;
            let converted = PendingTopN {
                id: ctx.next_plan_id(),
                by_items: Vec::new(),
                offset,
                count,
                origin: Origin::Limit {
                    id: plan.id,
                    child: child.id,
                },
                changed: false,
            };
            let result = push(child, Some(converted), ctx)?;
            Ok(place(result, pending, ctx))
        }
        Operator::TopN(topn) => {
            let (by_items, offset, count) = (topn.by_items.clone(), topn.offset, topn.count);
            let child = plan.take_single_child()?;
            let own = PendingTopN {
                id: plan.id,
                by_items,
                offset,
                count,
                origin: Origin::TopN { child: child.id },
                changed: false,
            };
            let result = push(child, Some(own), ctx)?;
            Ok(place(result, pending, ctx))
        }
        Operator::Sort(sort) => {
            let Some(mut topn) = pending else {
                let mut plan = plan.map_children(|c| push(c, None, ctx))?;
                refresh_key_info(&mut plan);
                return Ok(plan);
            };
            let items = sort.by_items.clone();
            topn.mark_changed(ctx);
            // A TopN that already orders makes the Sort redundant.
            if topn.by_items.is_empty() {
                let sort_id = plan.display_id();
                let topn_id = topn.display_id();
                ctx.record(
                    || format!("{} passes ByItems{} to {}", sort_id, by_item_list(&items), topn_id),
                    || format!("{} is Limit originally", topn_id),
                );
                topn.by_items = items;
            }
            let child = plan.take_single_child()?;
            push(child, Some(topn), ctx)
        }
        Operator::Projection(proj) => {
            let mut pending = pending;
            if let Some(topn) = pending.as_mut() {
                topn.by_items = substitute_items(&topn.by_items, &plan.schema, &proj.exprs);
                topn.mark_changed(ctx);
            }
            let child = plan.take_single_child()?;
            plan.children = vec![push(child, pending, ctx)?];
            refresh_key_info(&mut plan);
            Ok(plan)
        }
        Operator::TableDual(dual) => {
            let Some(mut topn) = pending else {
                return Ok(plan);
            };
            let rows = dual.row_count.saturating_sub(topn.offset).min(topn.count);
            topn.mark_changed(ctx);
            if let Operator::TableDual(dual) = &mut plan.op {
                dual.row_count = rows;
            }
            let dual_id = plan.display_id();
            ctx.record(
                || format!("{}'s row count becomes {}", dual_id, rows),
                || format!("{} is pushed down", topn.display_id()),
            );
            Ok(plan)
        }
        // Everything else is a stopping point.
        _ => {
            let mut plan = plan.map_children(|c| push(c, None, ctx))?;
            refresh_key_info(&mut plan);
            Ok(place(plan, pending, ctx))
        }
    }
}

/// Materialize `pending` as the parent of `child`.
fn place(child: LogicalPlan, pending: Option<PendingTopN>, ctx: &mut RuleContext<'_>) -> LogicalPlan {
    let Some(mut topn) = pending else {
        return child;
    };
    if !topn.changed {
        // Back where it started: keep the original node.
        let restored = match topn.origin {
            Origin::Limit { id, child: orig } if orig == child.id => Some((
                id,
                Operator::Limit(Limit {
                    offset: topn.offset,
                    count: topn.count,
                }),
            )),
            Origin::TopN { child: orig } if orig == child.id => Some((
                topn.id,
                Operator::TopN(TopN {
                    by_items: topn.by_items.clone(),
                    offset: topn.offset,
                    count: topn.count,
                }),
            )),
            _ => None,
        };
        if let Some((id, op)) = restored {
            let schema = child.schema.clone();
            let mut node = LogicalPlan::from_parts(id, op, schema, vec![child]);
            refresh_key_info(&mut node);
            return node;
        }
        topn.mark_changed(ctx);
    }

    let child_id = child.display_id();
    let schema = child.schema.clone();
    let (id, op) = if topn.by_items.is_empty() {
        (
            ctx.next_plan_id(),
            Operator::Limit(Limit {
                offset: topn.offset,
                count: topn.count,
            }),
        )
    } else {
        (
            topn.id,
            Operator::TopN(TopN {
                by_items: topn.by_items,
                offset: topn.offset,
                count: topn.count,
            }),
        )
    };
    let mut node = LogicalPlan::from_parts(id, op, schema, vec![child]);
    refresh_key_info(&mut node);

    #[cfg(feature = "tracing")]
    tracing::trace!(node = %node.display_id(), parent_of = %child_id, "placed topn");
    let (node_id, tp) = (node.display_id(), node.tp());
    ctx.record(
        || format!("{} is added as {}'s parent", node_id, child_id),
        || format!("{} is pushed down", tp),
    );
    node
}

/// A copy goes to the preserved side of an outer join when that side holds
/// every ordering column; the TopN itself stays above the join.
fn push_outer_join(plan: LogicalPlan, pending: Option<PendingTopN>, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let mut pending = pending;
    let join_type = match &plan.op {
        Operator::Join(join) => join.join_type,
        _ => return Ok(plan),
    };
    let (left, right) = plan.take_join_children()?;
    let outer_left = join_type == JoinType::LeftOuter;
    let (outer, inner) = if outer_left { (left, right) } else { (right, left) };

    let mut copy = None;
    if let Some(topn) = pending.as_mut() {
        let outer_ids = outer.schema.id_set();
        let contained = topn
            .by_items
            .iter()
            .all(|b| b.expr.column_ids().is_subset(&outer_ids));
        let bound = topn.copy_bound();
        if contained && !holds_tighter(&outer, &topn.by_items, bound) {
            topn.mark_changed(ctx);
            let new = PendingTopN {
                id: ctx.next_plan_id(),
                by_items: topn.by_items.clone(),
                offset: 0,
                count: bound,
                origin: Origin::Copy,
                changed: true,
            };
            let join_id = plan.display_id();
            let side = if outer_left { "left" } else { "right" };
            ctx.record(
                || format!("{} is added and pushed into {}'s {} table", new.display_id(), join_id, side),
                || {
                    format!(
                        "{}'s joinType is {}, and all ByItems{} contained in {} table",
                        join_id,
                        join_type,
                        by_item_list(&new.by_items),
                        side
                    )
                },
            );
            copy = Some(new);
        }
    }

    let outer = push(outer, copy, ctx)?;
    let inner = push(inner, None, ctx)?;
    plan.children = if outer_left { vec![outer, inner] } else { vec![inner, outer] };
    plan.refresh_schema();
    refresh_key_info(&mut plan);
    Ok(place(plan, pending, ctx))
}

/// Every union input gets a copy bounded by `count + offset`.
fn push_union(plan: LogicalPlan, pending: Option<PendingTopN>, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let mut pending = pending;
    let union_id = plan.display_id();
    let union_schema = plan.schema.clone();
    let children = std::mem::take(&mut plan.children);
    let mut new_children = Vec::with_capacity(children.len());
    for child in children {
        let mut copy = None;
        if let Some(topn) = pending.as_mut() {
            let exprs: Vec<Expr> = child.schema.columns.iter().map(Expr::col).collect();
            let by_items = substitute_items(&topn.by_items, &union_schema, &exprs);
            let bound = topn.copy_bound();
            if !holds_tighter(&child, &by_items, bound) {
                topn.mark_changed(ctx);
                let new = PendingTopN {
                    id: ctx.next_plan_id(),
                    by_items,
                    offset: 0,
                    count: bound,
                    origin: Origin::Copy,
                    changed: true,
                };
                ctx.record(
                    || format!("{} is added and pushed down across {}", new.display_id(), union_id),
                    String::new,
                );
                copy = Some(new);
            }
        }
        new_children.push(push(child, copy, ctx)?);
    }
    plan.children = new_children;
    refresh_key_info(&mut plan);
    Ok(place(plan, pending, ctx))
}

/// Rewrite ordering items over the inputs of a node whose output column `i`
/// is `exprs[i]`; items that become constant order nothing and are dropped.
fn substitute_items(items: &[ByItem], schema: &Schema, exprs: &[Expr]) -> Vec<ByItem> {
    let map: HashMap<ColumnId, Expr> = schema
        .columns
        .iter()
        .zip(exprs)
        .map(|(c, e)| (c.id, e.clone()))
        .collect();
    items
        .iter()
        .map(|b| ByItem {
            expr: b.expr.substitute(&map),
            desc: b.desc,
        })
        .filter(|b| !b.expr.is_constant())
        .collect()
}

/// `plan` (looking through Projections) is already a TopN on the same items,
/// or a Limit when there are none, keeping at most `bound` rows.
fn holds_tighter(plan: &LogicalPlan, by_items: &[ByItem], bound: u64) -> bool {
    match &plan.op {
        Operator::TopN(t) => t.by_items == by_items && t.offset.saturating_add(t.count) <= bound,
        Operator::Limit(l) => by_items.is_empty() && l.offset.saturating_add(l.count) <= bound,
        Operator::Projection(proj) => {
            let items = substitute_items(by_items, &plan.schema, &proj.exprs);
            plan.children
                .first()
                .is_some_and(|c| holds_tighter(c, &items, bound))
        }
        _ => false,
    }
}
