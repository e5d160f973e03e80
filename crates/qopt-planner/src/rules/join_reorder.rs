//! Greedy join reordering.
//!
//! A maximal tree of inner joins is flattened into its leaves plus the pool of
//! equality edges and other conditions. Starting from the cheapest leaf, the
//! connected leaf giving the cheapest join is attached until none is
//! connected; the connected trees left over are combined by cartesian joins,
//! pairwise, into a bushy tree.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use qopt_core::error::{Error, Result};
use qopt_core::expr::Expr;
use qopt_core::plan::{Join, JoinType, LogicalPlan, Operator};
use qopt_core::schema::{Column, ColumnId, Schema};

use crate::cost::{CostModel, StatsInfo};
use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct JoinReorder;

impl LogicalRule for JoinReorder {
    fn name(&self) -> &'static str {
        "join_reorder"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        let initial = join_order(&plan);
        let mut reorderer = Reorderer {
            model: CostModel::new(ctx.config),
            costs: BTreeMap::new(),
            solved: false,
        };
        let plan = reorderer.reorder(plan, ctx)?;
        if reorderer.solved {
            let costs = &reorderer.costs;
            ctx.record(
                || format!("join order becomes {} from original {}", join_order(&plan), initial),
                || {
                    let entries: Vec<String> = costs
                        .iter()
                        .map(|(name, cost)| format!("[{}, cost:{}]", name, cost))
                        .collect();
                    format!("join cost during reorder: [{}]", entries.join(","))
                },
            );
        }
        Ok(plan)
    }
}

/// A join tree under construction with its estimate and cumulative cost.
struct JoinNode {
    plan: LogicalPlan,
    stats: StatsInfo,
    cost: f64,
}

/// Flattened inner-join group.
#[derive(Default)]
struct JoinGroup {
    leaves: Vec<LogicalPlan>,
    eq_edges: Vec<(Column, Column)>,
    other_conds: Vec<Expr>,
}

struct Reorderer<'m> {
    model: CostModel<'m>,
    /// Every join and leaf costed, by join order name.
    costs: BTreeMap<String, f64>,
    solved: bool,
}

impl<'m> Reorderer<'m> {
    fn reorder(&mut self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        if !is_inner_join(&plan) || already_reordered(&plan) {
            let mut plan = plan.map_children(|c| self.reorder(c, ctx))?;
            plan.refresh_schema();
            return Ok(plan);
        }

        let original = plan.schema.clone();
        let mut group = JoinGroup::default();
        flatten(plan, &mut group)?;
        let leaves = std::mem::take(&mut group.leaves)
            .into_iter()
            .map(|leaf| self.reorder(leaf, ctx))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(leaves = leaves.len(), edges = group.eq_edges.len(), "reordering join group");
        let plan = self.solve(leaves, group, ctx)?;
        self.solved = true;
        if plan.schema.ids() == original.ids() {
            return Ok(plan);
        }
        let exprs = original.columns.iter().map(Expr::col).collect();
        let mut proj = LogicalPlan::projection(ctx.plan_ctx, plan, exprs);
        proj.schema = original;
        refresh_key_info(&mut proj);
        Ok(proj)
    }

    fn solve(&mut self, leaves: Vec<LogicalPlan>, group: JoinGroup, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        let mut nodes: Vec<JoinNode> = leaves
            .into_iter()
            .map(|plan| {
                let (stats, cost) = self.subtree_cost(&plan);
                self.costs.insert(join_order(&plan), cost);
                JoinNode { plan, stats, cost }
            })
            .collect();
        nodes.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(Ordering::Equal));

        let eq_edges = group.eq_edges;
        let mut others = group.other_conds;
        let mut trees = Vec::new();
        while !nodes.is_empty() {
            let mut current = nodes.remove(0);
            loop {
                let mut best: Option<(usize, Vec<(Column, Column)>, StatsInfo, f64)> = None;
                for (i, node) in nodes.iter().enumerate() {
                    let edges = connecting_edges(&eq_edges, &current.plan.schema, &node.plan.schema);
                    if edges.is_empty() {
                        continue;
                    }
                    let mut join = Join::new(JoinType::Inner);
                    join.eq_conds = edges;
                    let stats = self.model.join_stats(&join, &current.stats, &node.stats);
                    let cost = stats.row_count + current.cost + node.cost;
                    self.costs.insert(pair_order(&current.plan, &node.plan), cost);
                    if best.as_ref().map_or(true, |b| cost < b.3) {
                        best = Some((i, join.eq_conds, stats, cost));
                    }
                }
                let Some((idx, edges, stats, cost)) = best else {
                    break;
                };
                let node = nodes.remove(idx);
                let attached = take_covered(&mut others, &current.plan.schema, &node.plan.schema);
                let plan = reordered_join(ctx, current.plan, node.plan, edges, attached);
                current = JoinNode { plan, stats, cost };
            }
            trees.push(current.plan);
        }

        let mut root = bushy_join(trees, &mut others, ctx)?;
        if !others.is_empty() {
            root = LogicalPlan::selection(ctx.plan_ctx, root, others);
            refresh_key_info(&mut root);
        }
        Ok(root)
    }

    /// Estimate of `plan` and the sum of row counts over its subtree.
    fn subtree_cost(&self, plan: &LogicalPlan) -> (StatsInfo, f64) {
        let mut children = Vec::with_capacity(plan.children.len());
        let mut cost = 0.0;
        for child in &plan.children {
            let (stats, child_cost) = self.subtree_cost(child);
            cost += child_cost;
            children.push(stats);
        }
        let stats = self.model.derive_node(plan, &children);
        cost += stats.row_count;
        (stats, cost)
    }
}

fn is_inner_join(plan: &LogicalPlan) -> bool {
    matches!(&plan.op, Operator::Join(j) if j.join_type == JoinType::Inner)
}

/// Every join of the inner-join group rooted at `plan` came out of a reorder.
fn already_reordered(plan: &LogicalPlan) -> bool {
    match &plan.op {
        Operator::Join(j) if j.join_type == JoinType::Inner => {
            j.reordered && plan.children.iter().all(already_reordered)
        }
        _ => true,
    }
}

fn flatten(plan: LogicalPlan, group: &mut JoinGroup) -> Result<()> {
    if !is_inner_join(&plan) {
        group.leaves.push(plan);
        return Ok(());
    }
    let mut plan = plan;
    let (left, right) = plan.take_join_children()?;
    if let Operator::Join(join) = plan.op {
        group.eq_edges.extend(join.eq_conds);
        group.other_conds.extend(join.other_conds);
    }
    flatten(left, group)?;
    flatten(right, group)
}

/// Equality edges between the two schemas, oriented `(left, right)`.
fn connecting_edges(edges: &[(Column, Column)], left: &Schema, right: &Schema) -> Vec<(Column, Column)> {
    edges
        .iter()
        .filter_map(|(a, b)| {
            if left.contains(a.id) && right.contains(b.id) {
                Some((a.clone(), b.clone()))
            } else if left.contains(b.id) && right.contains(a.id) {
                Some((b.clone(), a.clone()))
            } else {
                None
            }
        })
        .collect()
}

/// Remove and return the conditions evaluable over both schemas together.
fn take_covered(conds: &mut Vec<Expr>, left: &Schema, right: &Schema) -> Vec<Expr> {
    let ids: HashSet<ColumnId> = left.id_set().union(&right.id_set()).copied().collect();
    let (covered, rest): (Vec<Expr>, Vec<Expr>) = std::mem::take(conds)
        .into_iter()
        .partition(|c| c.column_ids().is_subset(&ids));
    *conds = rest;
    covered
}

fn reordered_join(
    ctx: &mut RuleContext<'_>,
    left: LogicalPlan,
    right: LogicalPlan,
    eq_conds: Vec<(Column, Column)>,
    other_conds: Vec<Expr>,
) -> LogicalPlan {
    let mut plan = LogicalPlan::join(ctx.plan_ctx, JoinType::Inner, left, right, eq_conds, other_conds);
    if let Operator::Join(join) = &mut plan.op {
        join.reordered = true;
    }
    refresh_key_info(&mut plan);
    plan
}

/// Pair up neighbouring trees with cartesian joins until one is left.
fn bushy_join(trees: Vec<LogicalPlan>, others: &mut Vec<Expr>, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut level = trees;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut iter = level.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => {
                    let attached = take_covered(others, &left.schema, &right.schema);
                    next.push(reordered_join(ctx, left, right, Vec::new(), attached));
                }
                None => next.push(left),
            }
        }
        level = next;
    }
    level
        .pop()
        .ok_or_else(|| Error::malformed("join group", "no inputs to join"))
}

/// Join order of a tree: scans by name, joins as `(l*r)`; several roots are
/// listed as `[a,b]`.
pub fn join_order(plan: &LogicalPlan) -> String {
    let mut parts = order_parts(plan);
    match parts.len() {
        0 => plan.display_id(),
        1 => parts.pop().unwrap_or_default(),
        _ => format!("[{}]", parts.join(",")),
    }
}

fn pair_order(left: &LogicalPlan, right: &LogicalPlan) -> String {
    let mut parts = order_parts(left);
    parts.extend(order_parts(right));
    format!("({})", parts.join("*"))
}

/// Operators other than joins and scans are looked through.
fn order_parts(plan: &LogicalPlan) -> Vec<String> {
    match &plan.op {
        Operator::Join(_) => {
            let inner: Vec<String> = plan.children.iter().flat_map(order_parts).collect();
            vec![format!("({})", inner.join("*"))]
        }
        Operator::DataSource(ds) => vec![ds.display_name().to_string()],
        _ => plan.children.iter().flat_map(order_parts).collect(),
    }
}
