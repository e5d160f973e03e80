//! Projection elimination.
//!
//! Folds a Projection into the Projection above it, and removes projections
//! that only forward their child's columns unchanged.

use std::collections::HashMap;

use qopt_core::error::Result;
use qopt_core::expr::{expr_list, Expr};
use qopt_core::plan::{LogicalPlan, Operator};
use qopt_core::schema::ColumnId;

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct ProjectionEliminator;

impl LogicalRule for ProjectionEliminator {
    fn name(&self) -> &'static str {
        "projection_eliminate"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        // The root projection fixes the output list and always stays.
        eliminate(plan, false, ctx)
    }
}

/// `can_eliminate` is set when the nearest projection-like ancestor rebuilds its
/// output from expressions, so forwarding-only projections below it are redundant.
fn eliminate(plan: LogicalPlan, can_eliminate: bool, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let child_flag = match plan.op {
        Operator::Union => false,
        Operator::Projection(_) | Operator::Aggregation(_) => true,
        _ => can_eliminate,
    };
    let mut plan = plan.map_children(|c| eliminate(c, child_flag, ctx))?;
    plan.refresh_schema();

    if matches!(plan.op, Operator::Projection(_)) {
        plan = fold_child_projection(plan, ctx)?;
        if can_eliminate && forwards_child_columns(&plan)? {
            let proj_id = plan.display_id();
            let child = plan.take_single_child()?;
            #[cfg(feature = "tracing")]
            tracing::trace!(proj = %proj_id, "projection eliminated");
            ctx.record(
                || format!("{} is eliminated", proj_id),
                || format!("{}'s expressions are all columns of its child", proj_id),
            );
            return Ok(child);
        }
    }
    refresh_key_info(&mut plan);
    Ok(plan)
}

/// Substitute a child Projection's expressions into `plan` and drop the child.
fn fold_child_projection(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    if !matches!(plan.child(0)?.op, Operator::Projection(_)) {
        return Ok(plan);
    }
    let mut child = plan.take_single_child()?;
    let Operator::Projection(child_proj) = &child.op else {
        plan.children = vec![child];
        return Ok(plan);
    };
    let map: HashMap<ColumnId, Expr> = child
        .schema
        .columns
        .iter()
        .zip(&child_proj.exprs)
        .map(|(c, e)| (c.id, e.clone()))
        .collect();
    let child_id = child.display_id();
    let grandchild = child.take_single_child()?;
    if let Operator::Projection(proj) = &mut plan.op {
        proj.exprs = proj.exprs.iter().map(|e| e.substitute(&map)).collect();
    }
    plan.children = vec![grandchild];

    #[cfg(feature = "tracing")]
    tracing::trace!(proj = %plan.display_id(), child = %child_id, "folded child projection");
    if let Operator::Projection(proj) = &plan.op {
        let parent_id = plan.display_id();
        ctx.record(
            || format!("{} is eliminated, {}'s expressions changed into{}", child_id, parent_id, expr_list(&proj.exprs)),
            || format!("{}'s child {} is redundant", parent_id, child_id),
        );
    }
    Ok(plan)
}

/// The projection outputs exactly its child's columns, in order.
fn forwards_child_columns(plan: &LogicalPlan) -> Result<bool> {
    let Operator::Projection(proj) = &plan.op else {
        return Ok(false);
    };
    let child = plan.child(0)?;
    if proj.exprs.len() != child.schema.len() || plan.schema.ids() != child.schema.ids() {
        return Ok(false);
    }
    Ok(proj
        .exprs
        .iter()
        .zip(&child.schema.columns)
        .all(|(e, c)| e.as_column().is_some_and(|col| col.id == c.id)))
}
