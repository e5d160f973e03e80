//! Aggregation elimination.
//!
//! An aggregation whose group-by columns contain a key of its input sees one
//! row per group and becomes a projection. Independently, `distinct` is dropped
//! from a function whose arguments contain an input key.

use std::collections::HashSet;

use qopt_core::error::Result;
use qopt_core::expr::{BinOp, Expr, UnaryOp};
use qopt_core::keys::key_columns;
use qopt_core::plan::{AggFunc, AggKind, AggMode, LogicalPlan, Operator, Projection};
use qopt_core::schema::{column_list, ColumnId};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct AggregationEliminator;

impl LogicalRule for AggregationEliminator {
    fn name(&self) -> &'static str {
        "aggregation_eliminate"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        eliminate(plan, ctx)
    }
}

fn eliminate(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan.map_children(|c| eliminate(c, ctx))?;
    if !matches!(plan.op, Operator::Aggregation(_)) {
        return Ok(plan);
    }
    eliminate_distinct(&mut plan, ctx)?;
    eliminate_aggregation(plan, ctx)
}

fn eliminate_distinct(plan: &mut LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<()> {
    let child = plan.child(0)?;
    let Some(keys) = child.key_info.clone() else {
        return Ok(());
    };
    let child_schema = child.schema.clone();
    let Operator::Aggregation(agg) = &mut plan.op else {
        return Ok(());
    };
    for func in agg.agg_funcs.iter_mut().filter(|f| f.distinct) {
        let args: Option<HashSet<ColumnId>> = func.args.iter().map(|a| a.as_column().map(|c| c.id)).collect();
        let Some(args) = args else { continue };
        let Some(key) = keys.covering_any_key(&args) else {
            continue;
        };
        func.distinct = false;
        let name = func.kind.name();
        ctx.record(
            || format!("{name}(distinct ...) is simplified to {name}(...)"),
            || format!("{} is a unique key", column_list(key_columns(key, &child_schema))),
        );
    }
    Ok(())
}

fn eliminate_aggregation(plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
    let mut plan = plan;
    let Operator::Aggregation(agg) = &plan.op else {
        return Ok(plan);
    };
    if agg.agg_funcs.iter().any(|f| f.mode != AggMode::Complete) {
        return Ok(plan);
    }
    let group_cols: HashSet<ColumnId> = agg.group_by_columns().iter().map(|c| c.id).collect();
    let child = plan.child(0)?;
    let Some(key) = child
        .key_info
        .as_ref()
        .and_then(|k| k.covering_key(&group_cols))
        .map(<[ColumnId]>::to_vec)
    else {
        return Ok(plan);
    };
    let exprs: Vec<Expr> = agg.agg_funcs.iter().map(rewrite_func).collect();

    let child = plan.take_single_child()?;
    let key_text = column_list(key_columns(&key, &child.schema));
    let mut proj = LogicalPlan::from_parts(
        ctx.next_plan_id(),
        Operator::Projection(Projection { exprs }),
        plan.schema.clone(),
        vec![child],
    );
    refresh_key_info(&mut proj);

    #[cfg(feature = "tracing")]
    tracing::trace!(agg = %plan.display_id(), proj = %proj.display_id(), "aggregation eliminated");
    ctx.record(
        || format!("{} is simplified to a {}", plan.display_id(), proj.display_id()),
        || format!("{} is a unique key", key_text),
    );
    Ok(proj)
}

/// The value a function takes over a single-row group.
fn rewrite_func(func: &AggFunc) -> Expr {
    match func.kind {
        AggKind::Count => {
            let nullable: Vec<&Expr> = func.args.iter().filter(|a| a.nullable()).collect();
            let Some((first, rest)) = nullable.split_first() else {
                return Expr::int(1);
            };
            let is_null = |e: &Expr| Expr::unary(UnaryOp::IsNull, e.clone());
            let cond = rest
                .iter()
                .fold(is_null(first), |acc, e| Expr::binary(BinOp::Or, acc, is_null(e)));
            Expr::If {
                cond: Box::new(cond),
                then: Box::new(Expr::int(0)),
                otherwise: Box::new(Expr::int(1)),
            }
        }
        AggKind::Sum | AggKind::Avg | AggKind::Max | AggKind::Min | AggKind::FirstRow => {
            func.args.first().cloned().unwrap_or_else(|| Expr::lit(qopt_core::types::Scalar::Null))
        }
    }
}
