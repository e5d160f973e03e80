//! Outer join elimination.
//!
//! An outer join can be replaced by its outer input when nothing above reads
//! the inner side and the join cannot duplicate outer rows: either the inner
//! join keys are unique, or every consumer is a duplicate-agnostic aggregate.

use std::collections::HashSet;

use qopt_core::error::Result;
use qopt_core::plan::{JoinType, LogicalPlan, Operator};
use qopt_core::schema::{column_list, Column, ColumnId};

use crate::optimizer::RuleContext;
use crate::rules::build_key_info::refresh_key_info;
use crate::rules::LogicalRule;

pub struct OuterJoinEliminator;

impl LogicalRule for OuterJoinEliminator {
    fn name(&self) -> &'static str {
        "outer_join_eliminate"
    }

    fn optimize(&self, plan: LogicalPlan, ctx: &mut RuleContext<'_>) -> Result<LogicalPlan> {
        eliminate(plan, &[], &[], ctx)
    }
}

/// `parent_cols` are the columns read above `plan`; `agg_cols` the arguments
/// of the nearest enclosing aggregation when all its functions are
/// duplicate-agnostic, else empty.
fn eliminate(
    plan: LogicalPlan,
    agg_cols: &[Column],
    parent_cols: &[Column],
    ctx: &mut RuleContext<'_>,
) -> Result<LogicalPlan> {
    let mut plan = plan;
    while matches!(plan.op, Operator::Join(_)) {
        let (next, eliminated) = try_eliminate(plan, agg_cols, parent_cols, ctx)?;
        plan = next;
        if !eliminated {
            break;
        }
    }

    let mut parent_cols: Vec<Column> = match &plan.op {
        Operator::Projection(proj) => proj.exprs.iter().flat_map(|e| e.columns()).collect(),
        Operator::Aggregation(agg) => agg
            .group_by
            .iter()
            .flat_map(|e| e.columns())
            .chain(agg.agg_funcs.iter().flat_map(|f| f.columns()))
            .collect(),
        _ => {
            let mut cols = parent_cols.to_vec();
            cols.extend(plan.schema.columns.iter().cloned());
            cols
        }
    };
    dedup_columns(&mut parent_cols);

    let agg_cols: Vec<Column> = match &plan.op {
        Operator::Aggregation(agg) => {
            if agg.agg_funcs.iter().all(|f| f.is_duplicate_agnostic()) {
                let mut cols: Vec<Column> = agg.agg_funcs.iter().flat_map(|f| f.columns()).collect();
                dedup_columns(&mut cols);
                cols
            } else {
                Vec::new()
            }
        }
        _ => agg_cols.to_vec(),
    };

    let mut plan = plan.map_children(|c| eliminate(c, &agg_cols, &parent_cols, ctx))?;
    plan.refresh_schema();
    refresh_key_info(&mut plan);
    Ok(plan)
}

/// The outer input and `true` when the join was eliminated, else the join.
fn try_eliminate(
    plan: LogicalPlan,
    agg_cols: &[Column],
    parent_cols: &[Column],
    ctx: &mut RuleContext<'_>,
) -> Result<(LogicalPlan, bool)> {
    let mut plan = plan;
    let sides = match &plan.op {
        Operator::Join(join) => match join.join_type {
            JoinType::LeftOuter => Some((1, join.right_keys())),
            JoinType::RightOuter => Some((0, join.left_keys())),
            JoinType::Inner => None,
        },
        _ => None,
    };
    let Some((inner_idx, inner_keys)) = sides else {
        return Ok((plan, false));
    };
    let outer_ids = plan.child(1 - inner_idx)?.schema.id_set();
    if !all_from(parent_cols, &outer_ids) {
        return Ok((plan, false));
    }

    let join_id = plan.display_id();
    if all_from(agg_cols, &outer_ids) {
        let outer = take_outer(&mut plan, inner_idx)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(join = %join_id, "outer join eliminated under duplicate-agnostic aggregation");
        ctx.record(
            || format!("Outer {} is eliminated and become {}", join_id, outer.display_id()),
            || {
                format!(
                    "The columns{} in agg are from outer table, and the agg functions are duplicate agnostic",
                    column_list(agg_cols)
                )
            },
        );
        return Ok((outer, true));
    }

    let key_ids: HashSet<ColumnId> = inner_keys.iter().map(|c| c.id).collect();
    let inner = plan.child(inner_idx)?;
    if !keys_unique(inner, &key_ids) {
        return Ok((plan, false));
    }
    let outer = take_outer(&mut plan, inner_idx)?;
    #[cfg(feature = "tracing")]
    tracing::trace!(join = %join_id, "outer join eliminated on unique inner keys");
    ctx.record(
        || format!("Outer {} is eliminated and become {}", join_id, outer.display_id()),
        || {
            format!(
                "The columns{} are from outer table, and the inner join keys{} are unique",
                column_list(parent_cols),
                column_list(&inner_keys)
            )
        },
    );
    Ok((outer, true))
}

/// The inner join keys contain a non-null key of the inner input, or a
/// unique index (or the handle) of an inner scan.
fn keys_unique(inner: &LogicalPlan, key_ids: &HashSet<ColumnId>) -> bool {
    if inner
        .key_info
        .as_ref()
        .is_some_and(|k| k.covering_key(key_ids).is_some())
    {
        return true;
    }
    let Operator::DataSource(ds) = &inner.op else {
        return false;
    };
    ds.table.unique_key_offsets().iter().any(|offsets| {
        offsets
            .iter()
            .all(|o| ds.table_columns.get(*o).is_some_and(|c| key_ids.contains(&c.id)))
    })
}

fn take_outer(plan: &mut LogicalPlan, inner_idx: usize) -> Result<LogicalPlan> {
    let (left, right) = plan.take_join_children()?;
    Ok(if inner_idx == 1 { left } else { right })
}

fn all_from(cols: &[Column], ids: &HashSet<ColumnId>) -> bool {
    !cols.is_empty() && cols.iter().all(|c| ids.contains(&c.id))
}

fn dedup_columns(cols: &mut Vec<Column>) {
    let mut seen = HashSet::new();
    cols.retain(|c| seen.insert(c.id));
}
